use stagegate_instance::InstanceError;
use thiserror::Error;

/// Errors that end a scheduling loop.
#[derive(Debug, Error)]
pub enum SchedulerError {
  #[error(transparent)]
  Instance(#[from] InstanceError),

  #[error("scheduling loop was cancelled")]
  Cancelled,
}
