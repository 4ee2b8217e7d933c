use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use stagegate_instance::WorkflowInstance;

/// A workflow instance snapshot as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InstanceRecord {
  pub instance_id: String,
  pub workflow_type: String,
  pub current_stage: String,
  pub completed: bool,
  pub snapshot: Json<WorkflowInstance>,
  pub updated_at: DateTime<Utc>,
  pub last_polled_at: Option<DateTime<Utc>>,
}

impl InstanceRecord {
  pub fn from_instance(instance: &WorkflowInstance, updated_at: DateTime<Utc>) -> Self {
    Self {
      instance_id: instance.id().to_string(),
      workflow_type: instance.workflow_type().to_string(),
      current_stage: instance.current_stage().to_string(),
      completed: instance.all_activities_completed(),
      snapshot: Json(instance.clone()),
      updated_at,
      last_polled_at: None,
    }
  }
}
