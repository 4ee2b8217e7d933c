use serde::{Deserialize, Serialize};

use crate::activity::ActivityBlueprint;

/// Template for a stage: an ordered set of activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageBlueprint {
  pub name: String,
  pub activities: Vec<ActivityBlueprint>,
}

impl StageBlueprint {
  pub fn new(name: impl Into<String>, activities: Vec<ActivityBlueprint>) -> Self {
    Self {
      name: name.into(),
      activities,
    }
  }

  /// Look up an activity by code.
  pub fn activity(&self, code: &str) -> Option<&ActivityBlueprint> {
    self.activities.iter().find(|a| a.code == code)
  }
}
