//! Scheduler events and notifiers for observability.
//!
//! Events are emitted by the scheduling loop so consumers can observe runs,
//! e.g. to deliver the notifications an activity's wait request stands for.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Events emitted by a scheduling loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerEvent {
  /// A new run was initialized and its loop started.
  RunStarted {
    instance_id: String,
    workflow_type: String,
  },

  /// The loop of a restored run started again.
  RunResumed {
    instance_id: String,
    current_stage: String,
  },

  /// The run now waits for a signal about this activity.
  SignalAwaited {
    instance_id: String,
    activity_code: String,
  },

  /// An activity was marked SCHEDULED.
  ActivityScheduled {
    instance_id: String,
    activity_code: String,
    activity_name: String,
  },

  /// One poll finished.
  Polled {
    instance_id: String,
    poll: u64,
    scheduled: usize,
  },

  /// Every activity of every stage completed.
  RunCompleted { instance_id: String, polls: u64 },

  /// The loop stopped because it was cancelled.
  RunCancelled { instance_id: String },

  /// The loop stopped with an error.
  RunFailed { instance_id: String, error: String },
}

/// Trait for receiving scheduler events.
pub trait SchedulerNotifier: Send + Sync {
  /// Called when a scheduler event occurs.
  fn notify(&self, event: SchedulerEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl SchedulerNotifier for NoopNotifier {
  fn notify(&self, _event: SchedulerEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a scheduling loop. Volume is a
  // handful of events per poll.
  sender: mpsc::UnboundedSender<SchedulerEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
    Self { sender }
  }
}

impl SchedulerNotifier for ChannelNotifier {
  fn notify(&self, event: SchedulerEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

/// A notifier that writes every event to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl SchedulerNotifier for LogNotifier {
  fn notify(&self, event: SchedulerEvent) {
    match event {
      SchedulerEvent::RunStarted {
        instance_id,
        workflow_type,
      } => info!(%instance_id, %workflow_type, "run_started"),
      SchedulerEvent::RunResumed {
        instance_id,
        current_stage,
      } => info!(%instance_id, %current_stage, "run_resumed"),
      SchedulerEvent::SignalAwaited {
        instance_id,
        activity_code,
      } => info!(%instance_id, %activity_code, "signal_awaited"),
      SchedulerEvent::ActivityScheduled {
        instance_id,
        activity_code,
        activity_name,
      } => info!(%instance_id, %activity_code, %activity_name, "activity_scheduled"),
      SchedulerEvent::Polled {
        instance_id,
        poll,
        scheduled,
      } => info!(%instance_id, poll, scheduled, "polled"),
      SchedulerEvent::RunCompleted { instance_id, polls } => {
        info!(%instance_id, polls, "run_completed")
      }
      SchedulerEvent::RunCancelled { instance_id } => info!(%instance_id, "run_cancelled"),
      SchedulerEvent::RunFailed { instance_id, error } => {
        warn!(%instance_id, %error, "run_failed")
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_channel_notifier_forwards_events() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let notifier = ChannelNotifier::new(tx);

    notifier.notify(SchedulerEvent::RunCancelled {
      instance_id: "run-1".to_string(),
    });

    assert_eq!(
      rx.try_recv().unwrap(),
      SchedulerEvent::RunCancelled {
        instance_id: "run-1".to_string()
      }
    );
  }

  #[test]
  fn test_channel_notifier_ignores_dropped_receiver() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    ChannelNotifier::new(tx).notify(SchedulerEvent::RunCompleted {
      instance_id: "run-1".to_string(),
      polls: 1,
    });
  }

  #[test]
  fn test_event_serialization() {
    let event = SchedulerEvent::SignalAwaited {
      instance_id: "run-1".to_string(),
      activity_code: "SimpleOne".to_string(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["SignalAwaited"]["activity_code"], "SimpleOne");
  }
}
