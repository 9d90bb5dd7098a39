//! Append-only operation log. Written after every run, never read by the pipeline.

use super::model::OperationLogRow;
use super::{to_millis, Pool};
use crate::model::{OperationLogEntry, RunStatus, RunType};
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

/// Counts for one finished (or aborted) run.
#[derive(Debug, Clone)]
pub struct NewOperationLog<'a> {
    pub run_id: Uuid,
    pub scope_id: i64,
    pub run_type: RunType,
    pub status: RunStatus,
    pub attempted: u64,
    pub succeeded: u64,
    pub skipped: u64,
    pub purged: u64,
    pub errors: &'a [String],
}

#[instrument(skip_all, fields(scope_id = entry.scope_id, run_id = %entry.run_id))]
pub async fn append_operation_log(pool: &Pool, entry: &NewOperationLog<'_>) -> Result<i64> {
    let errors_json =
        serde_json::to_string(entry.errors).context("failed to serialize run errors")?;
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO operation_logs \
             (run_id, scope_id, run_type, status, attempted, succeeded, skipped, purged, \
              error_count, errors_json, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(entry.run_id.to_string())
    .bind(entry.scope_id)
    .bind(entry.run_type.as_str())
    .bind(entry.status.as_str())
    .bind(count(entry.attempted))
    .bind(count(entry.succeeded))
    .bind(count(entry.skipped))
    .bind(count(entry.purged))
    .bind(count(entry.errors.len() as u64))
    .bind(errors_json)
    .bind(to_millis(Utc::now()))
    .fetch_one(pool)
    .await
    .context("failed to append operation log")?;
    Ok(id)
}

/// Most recent entries for a scope, newest first.
#[instrument(skip_all, fields(scope_id, limit))]
pub async fn list_operation_logs(
    pool: &Pool,
    scope_id: i64,
    limit: u32,
) -> Result<Vec<OperationLogEntry>> {
    let rows = sqlx::query_as::<_, OperationLogRow>(
        "SELECT id, run_id, scope_id, run_type, status, attempted, succeeded, skipped, purged, \
                error_count, errors_json, created_at \
         FROM operation_logs WHERE scope_id = ? \
         ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(scope_id)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(OperationLogEntry::try_from).collect()
}

fn count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
