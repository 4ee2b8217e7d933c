//! Stagegate Blueprint
//!
//! This crate contains the immutable workflow templates for stagegate. A
//! blueprint is an ordered list of stages, each an ordered list of activities.
//! Activities may depend on other activities of the same stage, referenced by
//! their `code`.
//!
//! Blueprints are usually loaded from JSON:
//!
//! ```json
//! {
//!   "type": "Standard Workflow",
//!   "stages": [
//!     {
//!       "name": "Review",
//!       "activities": [
//!         { "name": "Draft", "code": "DRAFT", "type": "HUMAN" },
//!         { "name": "Approve", "code": "APPROVE", "type": "HUMAN", "dependencies": ["DRAFT"] }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! A blueprint must pass [`WorkflowBlueprint::validate`] before an instance can
//! be initialized from it. Validation failures are never discovered mid-run.

mod activity;
mod error;
mod stage;
mod validate;
mod workflow;

pub use activity::ActivityBlueprint;
pub use error::BlueprintError;
pub use stage::StageBlueprint;
pub use workflow::WorkflowBlueprint;
