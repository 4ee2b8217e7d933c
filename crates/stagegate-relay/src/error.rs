use stagegate_instance::InstanceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
  #[error("no running instance with id '{id}'")]
  InstanceNotFound { id: String },

  #[error(transparent)]
  Instance(#[from] InstanceError),

  #[error("invalid signal payload: {0}")]
  Payload(#[from] serde_json::Error),
}
