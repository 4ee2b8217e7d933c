use serde::{Deserialize, Serialize};

/// Template for a single activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityBlueprint {
  /// Human readable name, e.g. "Assign FO User".
  pub name: String,

  /// Unique within its stage. Used as the external signal key.
  pub code: String,

  /// Free-form classification, e.g. `HUMAN`.
  #[serde(rename = "type")]
  pub activity_type: String,

  /// Codes of activities in the same stage that must complete first.
  #[serde(default)]
  pub dependencies: Vec<String>,
}

impl ActivityBlueprint {
  pub fn new(
    name: impl Into<String>,
    code: impl Into<String>,
    activity_type: impl Into<String>,
  ) -> Self {
    Self {
      name: name.into(),
      code: code.into(),
      activity_type: activity_type.into(),
      dependencies: Vec::new(),
    }
  }

  /// Replace the dependency list.
  pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.dependencies = dependencies.into_iter().map(Into::into).collect();
    self
  }
}
