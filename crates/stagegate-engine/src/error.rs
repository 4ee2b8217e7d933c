use stagegate_blueprint::BlueprintError;
use stagegate_instance::InstanceError;
use stagegate_scheduler::SchedulerError;
use stagegate_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("instance '{id}' is already running")]
  AlreadyRunning { id: String },

  #[error("instance '{id}' already exists in the store")]
  AlreadyExists { id: String },

  #[error("instance '{id}' not found")]
  NotFound { id: String },

  #[error(transparent)]
  Blueprint(#[from] BlueprintError),

  #[error(transparent)]
  Instance(#[from] InstanceError),

  #[error(transparent)]
  Scheduler(#[from] SchedulerError),

  #[error("store error: {0}")]
  Store(#[from] StoreError),

  #[error("run task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}
