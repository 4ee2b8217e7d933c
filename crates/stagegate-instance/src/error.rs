use thiserror::Error;

use crate::status::ActivityStatus;

/// Boxed error returned by snapshot writers.
pub type WriteError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by instance operations.
///
/// Every error leaves the instance state untouched.
#[derive(Debug, Error)]
pub enum InstanceError {
  #[error("instance '{id}' is already initialized")]
  AlreadyInitialized { id: String },

  #[error("instance '{id}' has not been initialized")]
  NotInitialized { id: String },

  #[error("activity '{code}' not found in the active stage")]
  ActivityNotFound { code: String },

  #[error("activity '{code}' cannot move from {from} to {to}")]
  InvalidTransition {
    code: String,
    from: ActivityStatus,
    to: ActivityStatus,
  },

  #[error("workflow instance '{id}' has already completed")]
  WorkflowCompleted { id: String },

  #[error("invalid blueprint: {0}")]
  Blueprint(#[from] stagegate_blueprint::BlueprintError),

  #[error("failed to persist snapshot for instance '{id}'")]
  Persist {
    id: String,
    #[source]
    source: WriteError,
  },

  #[error("instance '{id}' is no longer running")]
  ActorStopped { id: String },
}
