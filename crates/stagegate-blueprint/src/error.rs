use thiserror::Error;

/// Errors raised while loading or validating a blueprint.
#[derive(Debug, Error)]
pub enum BlueprintError {
  #[error("blueprint has no stages")]
  NoStages,

  #[error("stage '{stage}' has no activities")]
  EmptyStage { stage: String },

  #[error("duplicate activity code '{code}' in stage '{stage}'")]
  DuplicateActivityCode { stage: String, code: String },

  #[error("activity '{code}' in stage '{stage}' depends on unknown activity '{dependency}'")]
  UnknownDependency {
    stage: String,
    code: String,
    dependency: String,
  },

  #[error("dependency cycle through activity '{code}' in stage '{stage}'")]
  DependencyCycle { stage: String, code: String },

  #[error("invalid blueprint JSON: {0}")]
  Parse(#[from] serde_json::Error),
}
