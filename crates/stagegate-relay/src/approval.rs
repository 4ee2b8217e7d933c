use serde::{Deserialize, Serialize};
use stagegate_instance::StatusUpdate;

use crate::error::RelayError;

/// Outcome carried by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalStatus {
  Approve,
  Reject,
  Indeterminate,
}

impl ApprovalStatus {
  /// The instance operation this outcome maps to.
  pub fn operation(self) -> StatusUpdate {
    match self {
      ApprovalStatus::Approve => StatusUpdate::CompleteActivity,
      ApprovalStatus::Reject => StatusUpdate::ActivityFailed,
      ApprovalStatus::Indeterminate => StatusUpdate::ActivityPending,
    }
  }
}

impl From<i64> for ApprovalStatus {
  fn from(value: i64) -> Self {
    match value {
      1 => ApprovalStatus::Approve,
      0 => ApprovalStatus::Reject,
      _ => ApprovalStatus::Indeterminate,
    }
  }
}

/// An external signal about one activity of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySignal {
  pub instance_id: String,
  pub activity_code: String,
  pub approval_status: i64,
}

impl ActivitySignal {
  pub fn new(
    instance_id: impl Into<String>,
    activity_code: impl Into<String>,
    approval_status: i64,
  ) -> Self {
    Self {
      instance_id: instance_id.into(),
      activity_code: activity_code.into(),
      approval_status,
    }
  }

  /// Parse a signal from its JSON payload.
  pub fn from_json_str(json: &str) -> Result<Self, RelayError> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn approval(&self) -> ApprovalStatus {
    ApprovalStatus::from(self.approval_status)
  }

  pub fn operation(&self) -> StatusUpdate {
    self.approval().operation()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_approval_status_from_integer() {
    assert_eq!(ApprovalStatus::from(1), ApprovalStatus::Approve);
    assert_eq!(ApprovalStatus::from(0), ApprovalStatus::Reject);
    assert_eq!(ApprovalStatus::from(2), ApprovalStatus::Indeterminate);
    assert_eq!(ApprovalStatus::from(-1), ApprovalStatus::Indeterminate);
    assert_eq!(ApprovalStatus::from(i64::MAX), ApprovalStatus::Indeterminate);
  }

  #[test]
  fn test_operation_table() {
    assert_eq!(
      ApprovalStatus::Approve.operation(),
      StatusUpdate::CompleteActivity
    );
    assert_eq!(
      ApprovalStatus::Reject.operation(),
      StatusUpdate::ActivityFailed
    );
    assert_eq!(
      ApprovalStatus::Indeterminate.operation(),
      StatusUpdate::ActivityPending
    );
  }

  #[test]
  fn test_signal_payload() {
    let signal = ActivitySignal::from_json_str(
      r#"{"instanceId": "run-1", "activityCode": "SimpleOne", "approvalStatus": 0}"#,
    )
    .unwrap();

    assert_eq!(signal, ActivitySignal::new("run-1", "SimpleOne", 0));
    assert_eq!(signal.operation(), StatusUpdate::ActivityFailed);
  }

  #[test]
  fn test_signal_payload_rejects_missing_fields() {
    assert!(matches!(
      ActivitySignal::from_json_str(r#"{"instanceId": "run-1"}"#),
      Err(RelayError::Payload(_))
    ));
  }
}
