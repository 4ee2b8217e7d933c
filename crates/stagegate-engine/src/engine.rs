//! The workflow engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stagegate_blueprint::WorkflowBlueprint;
use stagegate_instance::{
  DEFAULT_CHANNEL_CAPACITY, InstanceActor, InstanceError, InstanceHandle, WorkflowInstance,
};
use stagegate_relay::{InstanceDirectory, SignalRelay};
use stagegate_scheduler::{
  NoopNotifier, RunOutcome, Scheduler, SchedulerConfig, SchedulerError, SchedulerNotifier,
};
use stagegate_store::{Store, StoreError, StoreSnapshotWriter};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Time between two polls of the same run.
  pub poll_interval: Duration,
  /// Command channel capacity of each instance actor.
  pub channel_capacity: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      poll_interval: SchedulerConfig::default().poll_interval,
      channel_capacity: DEFAULT_CHANNEL_CAPACITY,
    }
  }
}

type RunTask = JoinHandle<Result<RunOutcome, SchedulerError>>;

/// Live runs, keyed by instance id.
#[derive(Default)]
struct Registry {
  instances: RwLock<HashMap<String, InstanceHandle>>,
  tasks: Mutex<HashMap<String, RunTask>>,
}

#[async_trait]
impl InstanceDirectory for Registry {
  async fn lookup(&self, instance_id: &str) -> Option<InstanceHandle> {
    self.instances.read().await.get(instance_id).cloned()
  }
}

enum Launch {
  Fresh(Arc<WorkflowBlueprint>),
  Resume,
}

/// Runs workflow instances to completion.
///
/// Generic over `N: SchedulerNotifier` so callers choose how scheduler events
/// are observed. Use `Engine::new()` to discard them.
pub struct Engine<N: SchedulerNotifier + 'static = NoopNotifier> {
  config: EngineConfig,
  store: Arc<dyn Store>,
  scheduler: Arc<Scheduler<N>>,
  registry: Arc<Registry>,
  cancel: CancellationToken,
}

impl Engine<NoopNotifier> {
  pub fn new(config: EngineConfig, store: Arc<dyn Store>) -> Self {
    Self::with_notifier(config, store, NoopNotifier)
  }
}

impl<N: SchedulerNotifier + 'static> Engine<N> {
  pub fn with_notifier(config: EngineConfig, store: Arc<dyn Store>, notifier: N) -> Self {
    let scheduler_config = SchedulerConfig {
      poll_interval: config.poll_interval,
    };
    let scheduler = Scheduler::with_notifier(scheduler_config, notifier).with_store(store.clone());

    Self {
      config,
      store,
      scheduler: Arc::new(scheduler),
      registry: Arc::new(Registry::default()),
      cancel: CancellationToken::new(),
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Start a run of `blueprint` under a fresh id.
  pub async fn start(&self, blueprint: Arc<WorkflowBlueprint>) -> Result<String, EngineError> {
    let id = uuid::Uuid::new_v4().to_string();
    self.start_with_id(&id, blueprint).await?;
    Ok(id)
  }

  /// Start a run of `blueprint` under the given id.
  pub async fn start_with_id(
    &self,
    id: &str,
    blueprint: Arc<WorkflowBlueprint>,
  ) -> Result<(), EngineError> {
    blueprint.validate()?;

    // Held across the store check so two starts of one id cannot both pass.
    let mut instances = self.registry.instances.write().await;
    if instances.contains_key(id) {
      return Err(EngineError::AlreadyRunning { id: id.to_string() });
    }
    match self.store.load_instance(id).await {
      Ok(_) => return Err(EngineError::AlreadyExists { id: id.to_string() }),
      Err(StoreError::NotFound(_)) => {}
      Err(e) => return Err(e.into()),
    }

    let run_cancel = self.cancel.child_token();
    let (handle, actor) = self.spawn_actor(WorkflowInstance::new(id), &run_cancel);
    instances.insert(id.to_string(), handle.clone());
    drop(instances);

    info!(
      instance_id = %id,
      workflow_type = %blueprint.workflow_type,
      "run_launched"
    );
    self
      .launch(handle, actor, run_cancel, Launch::Fresh(blueprint))
      .await;
    Ok(())
  }

  /// Reload every unfinished run from the store and resume its loop.
  ///
  /// Runs that are already live are skipped. Returns the ids of the resumed
  /// runs.
  pub async fn restore(&self) -> Result<Vec<String>, EngineError> {
    let snapshots = self.store.list_active().await?;
    let mut restored = Vec::new();

    for snapshot in snapshots {
      let id = snapshot.id().to_string();
      let mut instances = self.registry.instances.write().await;
      if instances.contains_key(&id) {
        debug!(instance_id = %id, "restore_skipped_live_run");
        continue;
      }

      let run_cancel = self.cancel.child_token();
      let (handle, actor) = self.spawn_actor(snapshot, &run_cancel);
      instances.insert(id.clone(), handle.clone());
      drop(instances);

      self.launch(handle, actor, run_cancel, Launch::Resume).await;
      restored.push(id);
    }

    info!(count = restored.len(), "runs_restored");
    Ok(restored)
  }

  /// Current state of a run: the live instance if it is running, else the
  /// last stored snapshot.
  pub async fn status(&self, id: &str) -> Result<WorkflowInstance, EngineError> {
    if let Some(handle) = self.registry.lookup(id).await {
      match handle.snapshot().await {
        Ok(snapshot) => return Ok(snapshot),
        // Finished between the lookup and the call; the store has it.
        Err(InstanceError::ActorStopped { .. }) => {}
        Err(e) => return Err(e.into()),
      }
    }

    match self.store.load_instance(id).await {
      Ok(snapshot) => Ok(snapshot),
      Err(StoreError::NotFound(_)) => Err(EngineError::NotFound { id: id.to_string() }),
      Err(e) => Err(e.into()),
    }
  }

  /// A relay that delivers signals to this engine's live runs.
  pub fn relay(&self) -> SignalRelay {
    SignalRelay::new(self.registry.clone())
  }

  /// Ids of the live runs.
  pub async fn running(&self) -> Vec<String> {
    self.registry.instances.read().await.keys().cloned().collect()
  }

  /// Wait for a run's loop to finish.
  ///
  /// Each run can be awaited once.
  pub async fn wait(&self, id: &str) -> Result<RunOutcome, EngineError> {
    let task = self
      .registry
      .tasks
      .lock()
      .await
      .remove(id)
      .ok_or_else(|| EngineError::NotFound { id: id.to_string() })?;

    Ok(task.await??)
  }

  /// Cancel every run and wait for the loops to stop.
  ///
  /// Snapshots stay in the store, so unfinished runs can be restored later.
  pub async fn shutdown(&self) {
    info!("engine_shutdown");
    self.cancel.cancel();

    let tasks: Vec<(String, RunTask)> = self.registry.tasks.lock().await.drain().collect();
    let (ids, tasks): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let results = futures::future::join_all(tasks).await;

    for (id, result) in ids.into_iter().zip(results) {
      if let Err(e) = result {
        warn!(instance_id = %id, error = %e, "run_task_panicked");
      }
    }
  }

  fn spawn_actor(
    &self,
    state: WorkflowInstance,
    cancel: &CancellationToken,
  ) -> (InstanceHandle, JoinHandle<()>) {
    let writer = Arc::new(StoreSnapshotWriter::new(self.store.clone()));
    InstanceActor::new(state)
      .with_writer(writer)
      .with_capacity(self.config.channel_capacity)
      .spawn(cancel.clone())
  }

  async fn launch(
    &self,
    handle: InstanceHandle,
    actor: JoinHandle<()>,
    cancel: CancellationToken,
    launch: Launch,
  ) {
    let id = handle.id().to_string();
    let scheduler = self.scheduler.clone();
    let registry = self.registry.clone();

    let task = tokio::spawn(async move {
      let result = match launch {
        Launch::Fresh(blueprint) => scheduler.run(&handle, blueprint, cancel.clone()).await,
        Launch::Resume => scheduler.resume(&handle, cancel.clone()).await,
      };

      registry.instances.write().await.remove(handle.id());
      // The actor applies what it already accepted, then stops.
      cancel.cancel();
      if let Err(e) = actor.await {
        warn!(instance_id = %handle.id(), error = %e, "instance_actor_panicked");
      }
      result
    });

    self.registry.tasks.lock().await.insert(id, task);
  }
}

impl<N: SchedulerNotifier + 'static> Drop for Engine<N> {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use stagegate_blueprint::{ActivityBlueprint, StageBlueprint};
  use stagegate_store::MemoryStore;

  fn single_activity_blueprint() -> Arc<WorkflowBlueprint> {
    Arc::new(WorkflowBlueprint::new(
      "Test",
      vec![StageBlueprint::new(
        "Only",
        vec![ActivityBlueprint::new("A", "A", "HUMAN")],
      )],
    ))
  }

  #[test]
  fn test_default_config() {
    let config = EngineConfig::default();
    assert_eq!(config.poll_interval, Duration::from_secs(50));
    assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
  }

  #[tokio::test]
  async fn test_start_registers_live_run() {
    let engine = Engine::new(EngineConfig::default(), Arc::new(MemoryStore::new()));

    let id = engine.start(single_activity_blueprint()).await.unwrap();
    assert_eq!(engine.running().await, vec![id.clone()]);
    assert!(engine.registry.lookup(&id).await.is_some());
    assert!(uuid::Uuid::parse_str(&id).is_ok());

    engine.shutdown().await;
    assert!(engine.running().await.is_empty());
  }

  #[tokio::test]
  async fn test_single_approval_completes_run() {
    let engine = Engine::new(
      EngineConfig {
        poll_interval: Duration::from_millis(10),
        ..EngineConfig::default()
      },
      Arc::new(MemoryStore::new()),
    );
    engine
      .start_with_id("run-1", single_activity_blueprint())
      .await
      .unwrap();

    // Completes from PENDING or SCHEDULED, whichever the first poll left.
    let handle = engine.registry.lookup("run-1").await.unwrap();
    loop {
      if handle.snapshot().await.unwrap().is_initialized() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(1)).await;
    }
    handle.complete_activity("A").await.unwrap();

    let outcome = engine.wait("run-1").await.unwrap();
    assert_eq!(
      outcome.messages.last().map(String::as_str),
      Some(stagegate_scheduler::NOTHING_TO_SCHEDULE)
    );
  }

  #[tokio::test]
  async fn test_pending_wait_observes_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(EngineConfig::default(), store.clone());
    engine
      .start_with_id("run-1", single_activity_blueprint())
      .await
      .unwrap();

    // Past the first poll, the loop sleeps for the full interval.
    let handle = engine.registry.lookup("run-1").await.unwrap();
    loop {
      let snapshot = handle.snapshot().await.unwrap();
      if snapshot.is_initialized()
        && snapshot.stages()[0].activity("A").unwrap().status
          == stagegate_instance::ActivityStatus::Scheduled
      {
        break;
      }
      tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // The wait owns the run task by the time shutdown starts.
    let (result, ()) = tokio::join!(engine.wait("run-1"), async {
      handle
        .signal(stagegate_instance::StatusUpdate::CompleteActivity, "A")
        .await
        .unwrap();
      engine.shutdown().await;
    });

    assert!(matches!(
      result,
      Err(EngineError::Scheduler(SchedulerError::Cancelled))
    ));
    // Accepted before shutdown, so it reached the store.
    let stored = store.load_instance("run-1").await.unwrap();
    assert!(stored.all_activities_completed());
  }
}
