use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stagegate_instance::WorkflowInstance;
use tokio::sync::RwLock;

use crate::types::InstanceRecord;
use crate::{Store, StoreError};

/// In-memory store. Snapshots are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
  records: RwLock<HashMap<String, InstanceRecord>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn save_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
    let mut records = self.records.write().await;
    let mut record = InstanceRecord::from_instance(instance, Utc::now());
    if let Some(existing) = records.get(instance.id()) {
      record.last_polled_at = existing.last_polled_at;
    }
    records.insert(record.instance_id.clone(), record);
    Ok(())
  }

  async fn load_instance(&self, instance_id: &str) -> Result<WorkflowInstance, StoreError> {
    self
      .records
      .read()
      .await
      .get(instance_id)
      .map(|r| r.snapshot.0.clone())
      .ok_or_else(|| StoreError::NotFound(instance_id.to_string()))
  }

  async fn list_active(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
    let records = self.records.read().await;
    let mut active: Vec<&InstanceRecord> = records.values().filter(|r| !r.completed).collect();
    active.sort_by_key(|r| r.updated_at);
    Ok(active.into_iter().map(|r| r.snapshot.0.clone()).collect())
  }

  async fn record_poll(&self, instance_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
    let mut records = self.records.write().await;
    let record = records
      .get_mut(instance_id)
      .ok_or_else(|| StoreError::NotFound(instance_id.to_string()))?;
    record.last_polled_at = Some(at);
    Ok(())
  }

  async fn last_poll(&self, instance_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    self
      .records
      .read()
      .await
      .get(instance_id)
      .map(|r| r.last_polled_at)
      .ok_or_else(|| StoreError::NotFound(instance_id.to_string()))
  }
}
