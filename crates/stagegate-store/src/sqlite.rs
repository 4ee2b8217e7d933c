use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use stagegate_instance::WorkflowInstance;

use crate::types::InstanceRecord;
use crate::{Store, StoreError};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if missing) a database file and run migrations.
  pub async fn open(path: &Path) -> Result<Self, StoreError> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }

  /// Get the full stored record of an instance.
  pub async fn get_record(&self, instance_id: &str) -> Result<InstanceRecord, StoreError> {
    sqlx::query_as(
      r#"
            SELECT instance_id, workflow_type, current_stage, completed, snapshot, updated_at, last_polled_at
            FROM workflow_instances
            WHERE instance_id = ?
            "#,
    )
    .bind(instance_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| StoreError::NotFound(instance_id.to_string()))
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn save_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
    let record = InstanceRecord::from_instance(instance, Utc::now());

    sqlx::query(
      r#"
            INSERT INTO workflow_instances (instance_id, workflow_type, current_stage, completed, snapshot, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (instance_id) DO UPDATE SET
                workflow_type = excluded.workflow_type,
                current_stage = excluded.current_stage,
                completed = excluded.completed,
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at
            "#,
    )
    .bind(&record.instance_id)
    .bind(&record.workflow_type)
    .bind(&record.current_stage)
    .bind(record.completed)
    .bind(&record.snapshot)
    .bind(record.updated_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn load_instance(&self, instance_id: &str) -> Result<WorkflowInstance, StoreError> {
    let record = self.get_record(instance_id).await?;
    Ok(record.snapshot.0)
  }

  async fn list_active(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
    let snapshots: Vec<(Json<WorkflowInstance>,)> = sqlx::query_as(
      r#"
            SELECT snapshot
            FROM workflow_instances
            WHERE completed = FALSE
            ORDER BY updated_at ASC
            "#,
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(snapshots.into_iter().map(|(s,)| s.0).collect())
  }

  async fn record_poll(&self, instance_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
    let result = sqlx::query(
      r#"
            UPDATE workflow_instances
            SET last_polled_at = ?
            WHERE instance_id = ?
            "#,
    )
    .bind(at)
    .bind(instance_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(StoreError::NotFound(instance_id.to_string()));
    }
    Ok(())
  }

  async fn last_poll(&self, instance_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    let record = self.get_record(instance_id).await?;
    Ok(record.last_polled_at)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use stagegate_blueprint::{ActivityBlueprint, StageBlueprint, WorkflowBlueprint};

  async fn open_temp() -> (SqliteStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = SqliteStore::open(&dir.path().join("stagegate.db"))
      .await
      .expect("failed to open store");
    (store, dir)
  }

  fn instance(id: &str) -> WorkflowInstance {
    let blueprint = WorkflowBlueprint::new(
      "Test",
      vec![StageBlueprint::new(
        "Only",
        vec![ActivityBlueprint::new("A", "A", "HUMAN")],
      )],
    );
    let mut instance = WorkflowInstance::new(id);
    instance.initialize(&blueprint).unwrap();
    instance
  }

  #[tokio::test]
  async fn test_save_and_load_round_trip() {
    let (store, _dir) = open_temp().await;
    let mut saved = instance("run-1");
    saved.activity_scheduled("A").unwrap();

    store.save_instance(&saved).await.unwrap();
    let loaded = store.load_instance("run-1").await.unwrap();
    assert_eq!(loaded, saved);

    let record = store.get_record("run-1").await.unwrap();
    assert_eq!(record.current_stage, "Only");
    assert!(!record.completed);
  }

  #[tokio::test]
  async fn test_save_overwrites_snapshot() {
    let (store, _dir) = open_temp().await;
    let mut run = instance("run-1");
    store.save_instance(&run).await.unwrap();

    run.complete_activity("A").unwrap();
    store.save_instance(&run).await.unwrap();

    let loaded = store.load_instance("run-1").await.unwrap();
    assert!(loaded.all_activities_completed());
  }

  #[tokio::test]
  async fn test_list_active_skips_completed() {
    let (store, _dir) = open_temp().await;
    let active = instance("active");
    let mut done = instance("done");
    done.complete_activity("A").unwrap();

    store.save_instance(&active).await.unwrap();
    store.save_instance(&done).await.unwrap();

    let listed = store.list_active().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), "active");
  }

  #[tokio::test]
  async fn test_poll_bookkeeping() {
    let (store, _dir) = open_temp().await;
    store.save_instance(&instance("run-1")).await.unwrap();
    assert_eq!(store.last_poll("run-1").await.unwrap(), None);

    let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
    store.record_poll("run-1", at).await.unwrap();
    assert_eq!(store.last_poll("run-1").await.unwrap(), Some(at));

    // Saving a new snapshot keeps the poll time.
    store.save_instance(&instance("run-1")).await.unwrap();
    assert_eq!(store.last_poll("run-1").await.unwrap(), Some(at));
  }

  #[tokio::test]
  async fn test_missing_instance() {
    let (store, _dir) = open_temp().await;
    assert!(matches!(
      store.load_instance("nope").await,
      Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
      store.record_poll("nope", Utc::now()).await,
      Err(StoreError::NotFound(_))
    ));
  }
}
