use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use stagegate_instance::{InstanceHandle, StatusUpdate, Transition};
use tracing::info;

use crate::approval::ActivitySignal;
use crate::error::RelayError;

/// Resolves instance ids to running instances.
#[async_trait]
pub trait InstanceDirectory: Send + Sync {
  async fn lookup(&self, instance_id: &str) -> Option<InstanceHandle>;
}

#[async_trait]
impl InstanceDirectory for HashMap<String, InstanceHandle> {
  async fn lookup(&self, instance_id: &str) -> Option<InstanceHandle> {
    self.get(instance_id).cloned()
  }
}

/// Delivers [`ActivitySignal`]s to the instances they address.
#[derive(Clone)]
pub struct SignalRelay {
  directory: Arc<dyn InstanceDirectory>,
}

impl SignalRelay {
  pub fn new(directory: Arc<dyn InstanceDirectory>) -> Self {
    Self { directory }
  }

  /// Enqueue the operation a signal maps to without waiting for it.
  ///
  /// Returns the chosen operation once the instance accepted it. Rejections
  /// (unknown activity, illegal transition) are logged by the instance.
  pub async fn relay(&self, signal: &ActivitySignal) -> Result<StatusUpdate, RelayError> {
    let handle = self.resolve(signal).await?;
    let operation = signal.operation();

    handle.signal(operation, &signal.activity_code).await?;
    info!(
      instance_id = %signal.instance_id,
      activity_code = %signal.activity_code,
      approval_status = signal.approval_status,
      operation = %operation,
      "signal_relayed"
    );
    Ok(operation)
  }

  /// Apply the operation a signal maps to and wait for its outcome.
  pub async fn relay_confirmed(&self, signal: &ActivitySignal) -> Result<Transition, RelayError> {
    let handle = self.resolve(signal).await?;
    let operation = signal.operation();

    let transition = handle.update(operation, &signal.activity_code).await?;
    info!(
      instance_id = %signal.instance_id,
      activity_code = %signal.activity_code,
      approval_status = signal.approval_status,
      operation = %operation,
      transition = ?transition,
      "signal_applied"
    );
    Ok(transition)
  }

  async fn resolve(&self, signal: &ActivitySignal) -> Result<InstanceHandle, RelayError> {
    self
      .directory
      .lookup(&signal.instance_id)
      .await
      .ok_or_else(|| RelayError::InstanceNotFound {
        id: signal.instance_id.clone(),
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use stagegate_blueprint::{ActivityBlueprint, StageBlueprint, WorkflowBlueprint};
  use stagegate_instance::{ActivityStatus, InstanceActor, InstanceError, WorkflowInstance};
  use tokio_util::sync::CancellationToken;

  fn human(code: &str) -> ActivityBlueprint {
    ActivityBlueprint::new(code, code, "HUMAN")
  }

  async fn relay_with_instance(id: &str) -> (SignalRelay, InstanceHandle) {
    let blueprint = Arc::new(WorkflowBlueprint::new(
      "Test",
      vec![
        StageBlueprint::new("First", vec![human("A"), human("B"), human("C")]),
        StageBlueprint::new("Second", vec![human("D")]),
      ],
    ));
    let (handle, _actor) =
      InstanceActor::new(WorkflowInstance::new(id)).spawn(CancellationToken::new());
    handle.initialize(blueprint).await.unwrap();

    let mut directory = HashMap::new();
    directory.insert(id.to_string(), handle.clone());
    (SignalRelay::new(Arc::new(directory)), handle)
  }

  async fn status_of(handle: &InstanceHandle, code: &str) -> ActivityStatus {
    let snapshot = handle.snapshot().await.unwrap();
    snapshot.stages()[0].activity(code).unwrap().status
  }

  #[tokio::test]
  async fn test_signal_mapping() {
    let (relay, handle) = relay_with_instance("run-1").await;

    let applied = relay
      .relay_confirmed(&ActivitySignal::new("run-1", "A", 1))
      .await
      .unwrap();
    assert_eq!(applied, Transition::Applied);
    assert_eq!(status_of(&handle, "A").await, ActivityStatus::Completed);

    relay
      .relay_confirmed(&ActivitySignal::new("run-1", "B", 0))
      .await
      .unwrap();
    assert_eq!(status_of(&handle, "B").await, ActivityStatus::Failed);

    relay
      .relay_confirmed(&ActivitySignal::new("run-1", "B", 42))
      .await
      .unwrap();
    assert_eq!(status_of(&handle, "B").await, ActivityStatus::Pending);
  }

  #[tokio::test]
  async fn test_fire_and_forget_relay() {
    let (relay, handle) = relay_with_instance("run-1").await;

    let operation = relay
      .relay(&ActivitySignal::new("run-1", "C", 1))
      .await
      .unwrap();
    assert_eq!(operation, StatusUpdate::CompleteActivity);

    // The snapshot request queues behind the signal.
    assert_eq!(status_of(&handle, "C").await, ActivityStatus::Completed);
  }

  #[tokio::test]
  async fn test_unknown_instance() {
    let (relay, _handle) = relay_with_instance("run-1").await;

    let result = relay.relay(&ActivitySignal::new("nope", "A", 1)).await;
    assert!(matches!(
      result,
      Err(RelayError::InstanceNotFound { id }) if id == "nope"
    ));
  }

  #[tokio::test]
  async fn test_confirmed_relay_reports_rejections() {
    let (relay, handle) = relay_with_instance("run-1").await;

    let result = relay
      .relay_confirmed(&ActivitySignal::new("run-1", "D", 1))
      .await;
    assert!(matches!(
      result,
      Err(RelayError::Instance(InstanceError::ActivityNotFound { .. }))
    ));

    relay
      .relay_confirmed(&ActivitySignal::new("run-1", "A", 1))
      .await
      .unwrap();
    let result = relay
      .relay_confirmed(&ActivitySignal::new("run-1", "A", 0))
      .await;
    assert!(matches!(
      result,
      Err(RelayError::Instance(InstanceError::InvalidTransition { .. }))
    ));
    assert_eq!(status_of(&handle, "A").await, ActivityStatus::Completed);
  }

  #[tokio::test]
  async fn test_relay_to_stopped_instance() {
    let cancel = CancellationToken::new();
    let (handle, actor) = InstanceActor::new(WorkflowInstance::new("run-1")).spawn(cancel.clone());
    cancel.cancel();
    actor.await.unwrap();

    let mut directory = HashMap::new();
    directory.insert("run-1".to_string(), handle);
    let relay = SignalRelay::new(Arc::new(directory));

    let result = relay.relay(&ActivitySignal::new("run-1", "A", 1)).await;
    assert!(matches!(
      result,
      Err(RelayError::Instance(InstanceError::ActorStopped { .. }))
    ));
  }
}
