//! Single-writer actor owning one [`WorkflowInstance`].
//!
//! All operations against an instance travel through one mpsc channel, so the
//! channel order is the total order of operations for that instance. A poll
//! from the scheduling loop and a signal from the relay can never observe or
//! mutate the instance concurrently.

use std::sync::Arc;

use async_trait::async_trait;
use stagegate_blueprint::WorkflowBlueprint;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{InstanceError, WriteError};
use crate::instance::{ActivityInstance, Transition, WorkflowInstance};
use crate::status::StatusUpdate;

/// Default capacity of the actor's command channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Destination for instance snapshots.
///
/// The actor writes the full snapshot after every mutating operation and only
/// commits the change in memory once the write succeeded.
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
  async fn write_snapshot(&self, instance: &WorkflowInstance) -> Result<(), WriteError>;
}

type Reply<T> = oneshot::Sender<Result<T, InstanceError>>;

enum Command {
  Initialize {
    blueprint: Arc<WorkflowBlueprint>,
    reply: Reply<()>,
  },
  ActivitiesToSchedule {
    reply: Reply<Vec<ActivityInstance>>,
  },
  AllActivitiesCompleted {
    reply: Reply<bool>,
  },
  ScheduleReady {
    reply: Reply<Vec<ActivityInstance>>,
  },
  Snapshot {
    reply: Reply<WorkflowInstance>,
  },
  Update {
    update: StatusUpdate,
    code: String,
    // None for fire-and-forget signals
    reply: Option<Reply<Transition>>,
  },
}

/// The task that owns a [`WorkflowInstance`].
pub struct InstanceActor {
  state: WorkflowInstance,
  writer: Option<Arc<dyn SnapshotWriter>>,
  capacity: usize,
}

impl InstanceActor {
  /// Create an actor for the given (possibly already initialized) instance.
  pub fn new(state: WorkflowInstance) -> Self {
    Self {
      state,
      writer: None,
      capacity: DEFAULT_CHANNEL_CAPACITY,
    }
  }

  /// Persist snapshots through `writer`.
  pub fn with_writer(mut self, writer: Arc<dyn SnapshotWriter>) -> Self {
    self.writer = Some(writer);
    self
  }

  /// Set the command channel capacity.
  pub fn with_capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity.max(1);
    self
  }

  /// Spawn the actor on the current tokio runtime.
  ///
  /// The actor stops when every handle has been dropped or `cancel` fires.
  pub fn spawn(self, cancel: CancellationToken) -> (InstanceHandle, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel(self.capacity);
    let handle = InstanceHandle {
      id: Arc::from(self.state.id()),
      sender,
    };
    let task = tokio::spawn(self.run(receiver, cancel));
    (handle, task)
  }

  async fn run(mut self, mut receiver: mpsc::Receiver<Command>, cancel: CancellationToken) {
    debug!(instance_id = %self.state.id(), "instance_actor_started");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          debug!(instance_id = %self.state.id(), "instance_actor_cancelled");
          // Operations accepted before cancellation are still applied.
          receiver.close();
          while let Some(command) = receiver.recv().await {
            self.handle(command).await;
          }
          break;
        }
        command = receiver.recv() => {
          match command {
            Some(command) => self.handle(command).await,
            None => break,
          }
        }
      }
    }

    debug!(instance_id = %self.state.id(), "instance_actor_stopped");
  }

  async fn handle(&mut self, command: Command) {
    // Send errors mean the caller went away; the operation still happened.
    match command {
      Command::Initialize { blueprint, reply } => {
        let result = self.commit(|state| state.initialize(&blueprint)).await;
        if result.is_ok() {
          info!(
            instance_id = %self.state.id(),
            workflow_type = %self.state.workflow_type(),
            current_stage = %self.state.current_stage(),
            "instance_initialized"
          );
        }
        let _ = reply.send(result);
      }
      Command::ActivitiesToSchedule { reply } => {
        let _ = reply.send(Ok(self.state.activities_to_schedule()));
      }
      Command::AllActivitiesCompleted { reply } => {
        let _ = reply.send(Ok(self.state.all_activities_completed()));
      }
      Command::ScheduleReady { reply } => {
        let result = self.commit(|state| state.schedule_ready()).await;
        if let Ok(scheduled) = &result
          && !scheduled.is_empty()
        {
          debug!(
            instance_id = %self.state.id(),
            stage = %self.state.current_stage(),
            count = scheduled.len(),
            "activities_scheduled"
          );
        }
        let _ = reply.send(result);
      }
      Command::Snapshot { reply } => {
        let _ = reply.send(Ok(self.state.clone()));
      }
      Command::Update {
        update,
        code,
        reply,
      } => {
        let result = self.commit(|state| state.apply(update, &code)).await;
        self.log_update(update, &code, &result);
        if let Some(reply) = reply {
          let _ = reply.send(result);
        }
      }
    }
  }

  /// Apply `op` to a copy of the state, persist it, then commit.
  async fn commit<T>(
    &mut self,
    op: impl FnOnce(&mut WorkflowInstance) -> Result<T, InstanceError>,
  ) -> Result<T, InstanceError> {
    let mut next = self.state.clone();
    let output = op(&mut next)?;

    if next != self.state {
      if let Some(writer) = &self.writer {
        writer
          .write_snapshot(&next)
          .await
          .map_err(|source| InstanceError::Persist {
            id: next.id().to_string(),
            source,
          })?;
      }
      self.state = next;
    }

    Ok(output)
  }

  fn log_update(
    &self,
    update: StatusUpdate,
    code: &str,
    result: &Result<Transition, InstanceError>,
  ) {
    let instance_id = self.state.id();
    match result {
      Ok(Transition::StageCompleted { stage, next }) => {
        info!(
          instance_id = %instance_id,
          activity_code = %code,
          stage = %stage,
          next_stage = ?next,
          "stage_completed"
        );
      }
      Ok(transition) => {
        debug!(
          instance_id = %instance_id,
          activity_code = %code,
          operation = %update,
          transition = ?transition,
          "activity_updated"
        );
      }
      Err(e) => {
        warn!(
          instance_id = %instance_id,
          activity_code = %code,
          operation = %update,
          error = %e,
          "activity_update_rejected"
        );
      }
    }
  }
}

/// Handle for sending operations to an instance actor.
#[derive(Debug, Clone)]
pub struct InstanceHandle {
  id: Arc<str>,
  sender: mpsc::Sender<Command>,
}

impl InstanceHandle {
  /// The instance id.
  pub fn id(&self) -> &str {
    &self.id
  }

  /// Whether the actor has stopped.
  pub fn is_closed(&self) -> bool {
    self.sender.is_closed()
  }

  pub async fn initialize(&self, blueprint: Arc<WorkflowBlueprint>) -> Result<(), InstanceError> {
    self
      .request(|reply| Command::Initialize { blueprint, reply })
      .await
  }

  pub async fn activities_to_schedule(&self) -> Result<Vec<ActivityInstance>, InstanceError> {
    self
      .request(|reply| Command::ActivitiesToSchedule { reply })
      .await
  }

  pub async fn all_activities_completed(&self) -> Result<bool, InstanceError> {
    self
      .request(|reply| Command::AllActivitiesCompleted { reply })
      .await
  }

  /// Check readiness and mark the ready activities SCHEDULED in one step.
  pub async fn schedule_ready(&self) -> Result<Vec<ActivityInstance>, InstanceError> {
    self.request(|reply| Command::ScheduleReady { reply }).await
  }

  /// Current state of the instance.
  pub async fn snapshot(&self) -> Result<WorkflowInstance, InstanceError> {
    self.request(|reply| Command::Snapshot { reply }).await
  }

  pub async fn activity_scheduled(&self, code: &str) -> Result<Transition, InstanceError> {
    self.update(StatusUpdate::ActivityScheduled, code).await
  }

  pub async fn activity_failed(&self, code: &str) -> Result<Transition, InstanceError> {
    self.update(StatusUpdate::ActivityFailed, code).await
  }

  pub async fn activity_pending(&self, code: &str) -> Result<Transition, InstanceError> {
    self.update(StatusUpdate::ActivityPending, code).await
  }

  pub async fn complete_activity(&self, code: &str) -> Result<Transition, InstanceError> {
    self.update(StatusUpdate::CompleteActivity, code).await
  }

  /// Apply a status operation and wait for its outcome.
  pub async fn update(
    &self,
    update: StatusUpdate,
    code: &str,
  ) -> Result<Transition, InstanceError> {
    let code = code.to_string();
    self
      .request(|reply| Command::Update {
        update,
        code,
        reply: Some(reply),
      })
      .await
  }

  /// Enqueue a status operation without waiting for it to be applied.
  ///
  /// Returns once the actor accepted the operation into its queue. Accepted
  /// operations are applied even if the actor is cancelled afterwards.
  /// Rejections are logged by the actor.
  pub async fn signal(&self, update: StatusUpdate, code: &str) -> Result<(), InstanceError> {
    self
      .sender
      .send(Command::Update {
        update,
        code: code.to_string(),
        reply: None,
      })
      .await
      .map_err(|_| self.stopped())
  }

  async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, InstanceError> {
    let (reply, response) = oneshot::channel();
    self
      .sender
      .send(command(reply))
      .await
      .map_err(|_| self.stopped())?;
    response.await.map_err(|_| self.stopped())?
  }

  fn stopped(&self) -> InstanceError {
    InstanceError::ActorStopped {
      id: self.id.to_string(),
    }
  }
}
