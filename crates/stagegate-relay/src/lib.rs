//! Stagegate Relay
//!
//! Translates inbound activity signals (`{instanceId, activityCode,
//! approvalStatus}`) into status operations on the addressed instance.
//!
//! | `approvalStatus` | [`ApprovalStatus`] | operation          |
//! |------------------|--------------------|--------------------|
//! | `1`              | `Approve`          | `CompleteActivity` |
//! | `0`              | `Reject`           | `ActivityFailed`   |
//! | anything else    | `Indeterminate`    | `ActivityPending`  |

mod approval;
mod error;
mod relay;

pub use approval::{ActivitySignal, ApprovalStatus};
pub use error::RelayError;
pub use relay::{InstanceDirectory, SignalRelay};
