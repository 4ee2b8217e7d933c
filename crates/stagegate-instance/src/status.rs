//! Status enumerations and the operations that move between them.
//!
//! The string forms (`PENDING`, `SCHEDULED`, ...) are part of the persisted
//! state contract and must round-trip exactly through serde, `Display` and
//! `FromStr`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a single activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
  Pending,
  Scheduled,
  Completed,
  Failed,
}

impl ActivityStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      ActivityStatus::Pending => "PENDING",
      ActivityStatus::Scheduled => "SCHEDULED",
      ActivityStatus::Completed => "COMPLETED",
      ActivityStatus::Failed => "FAILED",
    }
  }

  /// Whether moving from `self` to `next` is a legal transition.
  ///
  /// Staying in the same status is not a transition and returns `false`.
  pub fn can_transition_to(self, next: ActivityStatus) -> bool {
    use ActivityStatus::*;
    matches!(
      (self, next),
      (Pending, Scheduled)
        | (Pending, Completed)
        | (Scheduled, Completed)
        | (Pending, Failed)
        | (Scheduled, Failed)
        | (Failed, Pending)
        | (Scheduled, Pending)
    )
  }
}

impl fmt::Display for ActivityStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ActivityStatus {
  type Err = ParseStatusError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "PENDING" => Ok(ActivityStatus::Pending),
      "SCHEDULED" => Ok(ActivityStatus::Scheduled),
      "COMPLETED" => Ok(ActivityStatus::Completed),
      "FAILED" => Ok(ActivityStatus::Failed),
      other => Err(ParseStatusError(other.to_string())),
    }
  }
}

/// Status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
  Pending,
  Active,
  Completed,
}

impl StageStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      StageStatus::Pending => "PENDING",
      StageStatus::Active => "ACTIVE",
      StageStatus::Completed => "COMPLETED",
    }
  }
}

impl fmt::Display for StageStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StageStatus {
  type Err = ParseStatusError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "PENDING" => Ok(StageStatus::Pending),
      "ACTIVE" => Ok(StageStatus::Active),
      "COMPLETED" => Ok(StageStatus::Completed),
      other => Err(ParseStatusError(other.to_string())),
    }
  }
}

/// Unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct ParseStatusError(pub String);

/// A status-changing operation on a single activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusUpdate {
  ActivityScheduled,
  ActivityFailed,
  ActivityPending,
  CompleteActivity,
}

impl StatusUpdate {
  /// The activity status this operation moves to.
  pub fn target(&self) -> ActivityStatus {
    match self {
      StatusUpdate::ActivityScheduled => ActivityStatus::Scheduled,
      StatusUpdate::ActivityFailed => ActivityStatus::Failed,
      StatusUpdate::ActivityPending => ActivityStatus::Pending,
      StatusUpdate::CompleteActivity => ActivityStatus::Completed,
    }
  }
}

impl fmt::Display for StatusUpdate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      StatusUpdate::ActivityScheduled => "ActivityScheduled",
      StatusUpdate::ActivityFailed => "ActivityFailed",
      StatusUpdate::ActivityPending => "ActivityPending",
      StatusUpdate::CompleteActivity => "CompleteActivity",
    };
    f.write_str(name)
  }
}
