use serde::{Deserialize, Serialize};

use crate::error::BlueprintError;
use crate::stage::StageBlueprint;
use crate::validate;

/// An immutable workflow template.
///
/// Owned by whoever starts a run and shared read-only (usually behind an
/// `Arc`) by every instance created from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowBlueprint {
  /// Workflow label, e.g. "Standard Workflow".
  #[serde(rename = "type")]
  pub workflow_type: String,
  pub stages: Vec<StageBlueprint>,
}

impl WorkflowBlueprint {
  pub fn new(workflow_type: impl Into<String>, stages: Vec<StageBlueprint>) -> Self {
    Self {
      workflow_type: workflow_type.into(),
      stages,
    }
  }

  /// Parse and validate a blueprint from JSON.
  pub fn from_json_str(json: &str) -> Result<Self, BlueprintError> {
    let blueprint: WorkflowBlueprint = serde_json::from_str(json)?;
    blueprint.validate()?;
    Ok(blueprint)
  }

  /// Check the structural rules a blueprint must satisfy before a run can
  /// be initialized from it.
  ///
  /// - at least one stage, and every stage has at least one activity
  /// - activity codes are unique within their stage
  /// - dependencies name activities of the same stage
  /// - dependencies are acyclic
  pub fn validate(&self) -> Result<(), BlueprintError> {
    if self.stages.is_empty() {
      return Err(BlueprintError::NoStages);
    }

    for stage in &self.stages {
      validate::validate_stage(stage)?;
    }

    Ok(())
  }

  /// Total number of activities across all stages.
  pub fn activity_count(&self) -> usize {
    self.stages.iter().map(|s| s.activities.len()).sum()
  }
}
