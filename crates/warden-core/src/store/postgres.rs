//! Primary durable-store backend, backed by `warden-db`'s
//! `harness_checkpoints` table.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::PgPool;
use warden_db::models::HarnessStatus;
use warden_db::queries::checkpoints;

use super::{DurableStore, PersistedDocument, StoreError};

/// Postgres-backed primary store.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn field<'a>(doc: &'a serde_json::Value, key: &str) -> Result<&'a str, StoreError> {
        doc.get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| StoreError::Backend(format!("document missing field {key:?}")))
    }
}

#[async_trait]
impl DurableStore for PostgresStore {
    async fn persist(&self, harness_id: &str, doc: &PersistedDocument) -> Result<(), StoreError> {
        let agent_name = Self::field(&doc.json, "agentName")?;
        let task_id = Self::field(&doc.json, "taskId")?;
        let parent_harness_id = doc
            .json
            .get("parentHarnessId")
            .and_then(|v| v.as_str());
        let status_str = Self::field(&doc.json, "status")?;
        let status = HarnessStatus::from_str(status_str)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let depth = doc.json.get("depth").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
        let checkpoint_count = doc
            .json
            .get("checkpointCount")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        checkpoints::upsert_checkpoint(
            &self.pool,
            harness_id,
            doc.schema_version as i32,
            agent_name,
            task_id,
            parent_harness_id,
            status,
            depth,
            checkpoint_count,
            &doc.json,
        )
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn restore(&self, harness_id: &str) -> Result<Option<PersistedDocument>, StoreError> {
        let row = checkpoints::get_checkpoint(&self.pool, harness_id)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(row.map(|r| PersistedDocument {
            schema_version: r.schema_version as u32,
            json: r.payload,
        }))
    }

    async fn delete(&self, harness_id: &str) -> Result<(), StoreError> {
        checkpoints::delete_checkpoint(&self.pool, harness_id)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let rows = checkpoints::list_harnesses(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows.into_iter().map(|r| r.harness_id).collect())
    }

    async fn is_available(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
