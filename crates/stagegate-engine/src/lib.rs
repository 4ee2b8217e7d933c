//! Stagegate Engine
//!
//! Hosts many concurrent workflow runs. Each run is an instance actor plus a
//! scheduling loop, both bound to a per-run cancellation token that is a
//! child of the engine's root token. Runs share nothing but the read-only
//! blueprint and the snapshot store.

mod engine;
mod error;

pub use engine::{Engine, EngineConfig};
pub use error::EngineError;
