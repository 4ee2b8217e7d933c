//! Stagegate Instance
//!
//! This crate holds the live, mutable side of a workflow run: the
//! [`WorkflowInstance`] state machine and the actor that owns it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      InstanceHandle                         │
//! │  - cheap to clone, one per collaborator                     │
//! │  - scheduling loop polls, signal relay updates              │
//! └─────────────────────────────────────────────────────────────┘
//!                               │ mpsc (one total order)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      InstanceActor                          │
//! │  - exclusive owner of the WorkflowInstance                  │
//! │  - copy, persist snapshot, then commit                      │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    WorkflowInstance                         │
//! │  - readiness computation, status transitions                │
//! │  - stage advancement                                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let (handle, _task) = InstanceActor::new(WorkflowInstance::new("run-1"))
//!   .spawn(CancellationToken::new());
//!
//! handle.initialize(blueprint).await?;
//! for activity in handle.activities_to_schedule().await? {
//!   handle.activity_scheduled(&activity.code).await?;
//! }
//! ```

mod actor;
mod error;
mod instance;
mod status;

pub use actor::{DEFAULT_CHANNEL_CAPACITY, InstanceActor, InstanceHandle, SnapshotWriter};
pub use error::{InstanceError, WriteError};
pub use instance::{ActivityInstance, StageInstance, Transition, WorkflowInstance};
pub use status::{ActivityStatus, ParseStatusError, StageStatus, StatusUpdate};
