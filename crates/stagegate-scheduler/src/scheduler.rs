//! The polling loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use stagegate_blueprint::WorkflowBlueprint;
use stagegate_instance::{InstanceError, InstanceHandle};
use stagegate_store::Store;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::SchedulerError;
use crate::events::{NoopNotifier, SchedulerEvent, SchedulerNotifier};

/// Message recorded when a run has nothing left to schedule.
pub const NOTHING_TO_SCHEDULE: &str = "There is no activities to schedule.";

/// Configuration for scheduling loops.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
  /// Time between two polls of the same instance.
  pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_secs(50),
    }
  }
}

/// Result of a run that reached completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
  pub instance_id: String,
  /// Human-readable output, one line per scheduled activity plus the final
  /// completion line.
  pub messages: Vec<String>,
  /// Number of polls the loop performed.
  pub polls: u64,
}

/// Drives workflow instances to completion by polling them.
///
/// Generic over `N: SchedulerNotifier` so callers choose how events are
/// observed. One `Scheduler` can drive any number of runs concurrently.
pub struct Scheduler<N: SchedulerNotifier = NoopNotifier> {
  config: SchedulerConfig,
  notifier: N,
  store: Option<Arc<dyn Store>>,
}

impl Scheduler<NoopNotifier> {
  /// Create a scheduler that discards events.
  pub fn new(config: SchedulerConfig) -> Self {
    Self::with_notifier(config, NoopNotifier)
  }
}

impl<N: SchedulerNotifier> Scheduler<N> {
  pub fn with_notifier(config: SchedulerConfig, notifier: N) -> Self {
    Self {
      config,
      notifier,
      store: None,
    }
  }

  /// Record poll times in `store`.
  pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
    self.store = Some(store);
    self
  }

  pub fn config(&self) -> &SchedulerConfig {
    &self.config
  }

  /// Initialize a fresh instance from `blueprint` and poll it until every
  /// activity completed.
  #[instrument(
    name = "scheduler_run",
    skip(self, handle, blueprint, cancel),
    fields(instance_id = %handle.id(), workflow_type = %blueprint.workflow_type)
  )]
  pub async fn run(
    &self,
    handle: &InstanceHandle,
    blueprint: Arc<WorkflowBlueprint>,
    cancel: CancellationToken,
  ) -> Result<RunOutcome, SchedulerError> {
    let workflow_type = blueprint.workflow_type.clone();
    let result = async {
      call(&cancel, handle.initialize(blueprint)).await?;
      self.notifier.notify(SchedulerEvent::RunStarted {
        instance_id: handle.id().to_string(),
        workflow_type,
      });
      self.poll_loop(handle, &cancel).await
    }
    .await;

    self.finish(handle, result)
  }

  /// Poll an instance restored from a snapshot.
  ///
  /// Activities already SCHEDULED are not reported again.
  #[instrument(
    name = "scheduler_resume",
    skip(self, handle, cancel),
    fields(instance_id = %handle.id())
  )]
  pub async fn resume(
    &self,
    handle: &InstanceHandle,
    cancel: CancellationToken,
  ) -> Result<RunOutcome, SchedulerError> {
    let result = async {
      let snapshot = call(&cancel, handle.snapshot()).await?;
      if !snapshot.is_initialized() {
        return Err(SchedulerError::Instance(InstanceError::NotInitialized {
          id: handle.id().to_string(),
        }));
      }

      self.notifier.notify(SchedulerEvent::RunResumed {
        instance_id: handle.id().to_string(),
        current_stage: snapshot.current_stage().to_string(),
      });
      self.poll_loop(handle, &cancel).await
    }
    .await;

    self.finish(handle, result)
  }

  async fn poll_loop(
    &self,
    handle: &InstanceHandle,
    cancel: &CancellationToken,
  ) -> Result<RunOutcome, SchedulerError> {
    let instance_id = handle.id().to_string();
    let mut messages = Vec::new();
    let mut polls: u64 = 0;

    loop {
      if cancel.is_cancelled() {
        return Err(SchedulerError::Cancelled);
      }

      let completed = call(cancel, handle.all_activities_completed()).await?;
      polls += 1;

      if completed {
        messages.push(NOTHING_TO_SCHEDULE.to_string());
        self.notifier.notify(SchedulerEvent::RunCompleted {
          instance_id: instance_id.clone(),
          polls,
        });
        return Ok(RunOutcome {
          instance_id,
          messages,
          polls,
        });
      }

      // Readiness is checked by the actor in the same step that marks the
      // activities SCHEDULED, so a stage advancing mid-poll cannot leak
      // scheduling into the next stage.
      let ready = call(cancel, handle.schedule_ready()).await?;
      let scheduled = ready.len();
      for activity in ready {
        self.notifier.notify(SchedulerEvent::SignalAwaited {
          instance_id: instance_id.clone(),
          activity_code: activity.code.clone(),
        });
        self.notifier.notify(SchedulerEvent::ActivityScheduled {
          instance_id: instance_id.clone(),
          activity_code: activity.code.clone(),
          activity_name: activity.name.clone(),
        });
        messages.push(format!("{} has been scheduled.", activity.name));
      }

      self.notifier.notify(SchedulerEvent::Polled {
        instance_id: instance_id.clone(),
        poll: polls,
        scheduled,
      });

      if let Some(store) = &self.store
        && let Err(e) = store.record_poll(&instance_id, Utc::now()).await
      {
        warn!(instance_id = %instance_id, error = %e, "record_poll_failed");
      }

      tokio::select! {
        _ = cancel.cancelled() => return Err(SchedulerError::Cancelled),
        _ = tokio::time::sleep(self.config.poll_interval) => {}
      }
    }
  }

  fn finish(
    &self,
    handle: &InstanceHandle,
    result: Result<RunOutcome, SchedulerError>,
  ) -> Result<RunOutcome, SchedulerError> {
    let instance_id = handle.id().to_string();
    match &result {
      Ok(outcome) => {
        info!(instance_id = %instance_id, polls = outcome.polls, "run_completed");
      }
      Err(SchedulerError::Cancelled) => {
        info!(instance_id = %instance_id, "run_cancelled");
        self
          .notifier
          .notify(SchedulerEvent::RunCancelled { instance_id });
      }
      Err(e) => {
        warn!(instance_id = %instance_id, error = %e, "run_failed");
        self.notifier.notify(SchedulerEvent::RunFailed {
          instance_id,
          error: e.to_string(),
        });
      }
    }
    result
  }
}

/// Await an actor call unless the loop is cancelled first.
async fn call<T>(
  cancel: &CancellationToken,
  request: impl Future<Output = Result<T, InstanceError>>,
) -> Result<T, SchedulerError> {
  tokio::select! {
    _ = cancel.cancelled() => Err(SchedulerError::Cancelled),
    result = request => result.map_err(SchedulerError::from),
  }
}
