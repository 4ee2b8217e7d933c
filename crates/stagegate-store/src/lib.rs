//! Stagegate Store
//!
//! This crate provides the storage trait and implementations for workflow
//! instance snapshots. Every accepted mutation of an instance is written as a
//! full snapshot, so a restarted process can reload unfinished runs and resume
//! their scheduling loops.
//!
//! The [`Store`] trait defines operations for:
//! - Saving and loading instance snapshots
//! - Listing unfinished (active) instances for restore
//! - Recording the last poll time of a scheduling loop

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::InstanceRecord;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stagegate_instance::{SnapshotWriter, WorkflowInstance, WriteError};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Applying migrations failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage trait for workflow instance snapshots.
#[async_trait]
pub trait Store: Send + Sync {
  /// Insert or replace the snapshot of an instance.
  async fn save_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError>;

  /// Get the latest snapshot of an instance.
  async fn load_instance(&self, instance_id: &str) -> Result<WorkflowInstance, StoreError>;

  /// List instances that have not completed yet.
  async fn list_active(&self) -> Result<Vec<WorkflowInstance>, StoreError>;

  /// Record when the scheduling loop of an instance last polled it.
  async fn record_poll(&self, instance_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

  /// Get the last recorded poll time of an instance.
  async fn last_poll(&self, instance_id: &str) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// Adapts a [`Store`] into the instance actor's [`SnapshotWriter`].
#[derive(Clone)]
pub struct StoreSnapshotWriter {
  store: Arc<dyn Store>,
}

impl StoreSnapshotWriter {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self { store }
  }
}

#[async_trait]
impl SnapshotWriter for StoreSnapshotWriter {
  async fn write_snapshot(&self, instance: &WorkflowInstance) -> Result<(), WriteError> {
    self.store.save_instance(instance).await?;
    Ok(())
  }
}
