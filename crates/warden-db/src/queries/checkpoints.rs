//! Database query functions for the `harness_checkpoints` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{HarnessCheckpointRow, HarnessStatus, HarnessSummaryRow};

/// Upsert a harness checkpoint.
///
/// The harness's JSON payload is the source of truth; the flattened columns
/// are kept in sync on every write purely so listings can avoid deserializing
/// the payload.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_checkpoint(
    pool: &PgPool,
    harness_id: &str,
    schema_version: i32,
    agent_name: &str,
    task_id: &str,
    parent_harness_id: Option<&str>,
    status: HarnessStatus,
    depth: i32,
    checkpoint_count: i64,
    payload: &serde_json::Value,
) -> Result<HarnessCheckpointRow> {
    let row = sqlx::query_as::<_, HarnessCheckpointRow>(
        "INSERT INTO harness_checkpoints \
            (harness_id, schema_version, agent_name, task_id, parent_harness_id, status, depth, checkpoint_count, payload) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (harness_id) DO UPDATE SET \
            schema_version = EXCLUDED.schema_version, \
            agent_name = EXCLUDED.agent_name, \
            task_id = EXCLUDED.task_id, \
            parent_harness_id = EXCLUDED.parent_harness_id, \
            status = EXCLUDED.status, \
            depth = EXCLUDED.depth, \
            checkpoint_count = EXCLUDED.checkpoint_count, \
            payload = EXCLUDED.payload, \
            updated_at = now() \
         RETURNING *",
    )
    .bind(harness_id)
    .bind(schema_version)
    .bind(agent_name)
    .bind(task_id)
    .bind(parent_harness_id)
    .bind(status)
    .bind(depth)
    .bind(checkpoint_count)
    .bind(payload)
    .fetch_one(pool)
    .await
    .context("failed to upsert harness checkpoint")?;

    Ok(row)
}

/// Fetch the latest checkpoint for a harness.
pub async fn get_checkpoint(pool: &PgPool, harness_id: &str) -> Result<Option<HarnessCheckpointRow>> {
    let row = sqlx::query_as::<_, HarnessCheckpointRow>(
        "SELECT * FROM harness_checkpoints WHERE harness_id = $1",
    )
    .bind(harness_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch harness checkpoint")?;

    Ok(row)
}

/// Delete a harness's checkpoint row.
pub async fn delete_checkpoint(pool: &PgPool, harness_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM harness_checkpoints WHERE harness_id = $1")
        .bind(harness_id)
        .execute(pool)
        .await
        .context("failed to delete harness checkpoint")?;

    Ok(())
}

/// List every harness's summary, most recently updated first.
pub async fn list_harnesses(pool: &PgPool) -> Result<Vec<HarnessSummaryRow>> {
    let rows = sqlx::query_as::<_, HarnessSummaryRow>(
        "SELECT harness_id, agent_name, task_id, status, created_at, updated_at \
         FROM harness_checkpoints ORDER BY updated_at DESC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list harnesses")?;

    Ok(rows)
}

/// List every harness whose `parent_harness_id` matches the given parent.
pub async fn list_children(pool: &PgPool, parent_harness_id: &str) -> Result<Vec<HarnessSummaryRow>> {
    let rows = sqlx::query_as::<_, HarnessSummaryRow>(
        "SELECT harness_id, agent_name, task_id, status, created_at, updated_at \
         FROM harness_checkpoints WHERE parent_harness_id = $1 ORDER BY created_at ASC",
    )
    .bind(parent_harness_id)
    .fetch_all(pool)
    .await
    .context("failed to list child harnesses")?;

    Ok(rows)
}
