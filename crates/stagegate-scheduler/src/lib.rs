//! Stagegate Scheduler
//!
//! The scheduling loop that drives one workflow instance to completion. The
//! loop is a poller: every poll it asks the instance which activities are
//! ready, marks them SCHEDULED, and sleeps. It never waits on signals itself;
//! progress made by relayed signals is observed on the next poll.
//!
//! ```text
//!   ┌──────────────┐  ActivitiesToSchedule   ┌────────────────┐
//!   │  Scheduler   │ ──────────────────────▶ │ InstanceActor  │ ◀── signals
//!   │  (one loop   │  ActivityScheduled      │ (single writer)│
//!   │   per run)   │ ◀────────────────────── └────────────────┘
//!   └──────┬───────┘
//!          │ SchedulerEvent
//!          ▼
//!   SchedulerNotifier (noop / channel / log)
//! ```

mod error;
mod events;
mod scheduler;

pub use error::SchedulerError;
pub use events::{ChannelNotifier, LogNotifier, NoopNotifier, SchedulerEvent, SchedulerNotifier};
pub use scheduler::{NOTHING_TO_SCHEDULE, RunOutcome, Scheduler, SchedulerConfig};
