//! Fetch orchestrator: one cycle pulls every member of a scope, merges the
//! posts, runs the purge sweeps and appends one operation log entry.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn, Span};
use uuid::Uuid;

use crate::db::{self, NewOperationLog, Pool};
use crate::error::PipelineError;
use crate::model::{NormalizedPost, RunStatus, RunType, SettingsDefaults};
use crate::provider::PostProvider;
use crate::retention;

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub chunk_size: usize,
    pub defaults: SettingsDefaults,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub run_id: Uuid,
    pub scope_id: i64,
    /// Members whose provider call was attempted.
    pub attempted: u64,
    /// Distinct new rows across all members.
    pub inserted: u64,
    /// Returned posts that were not inserted (already stored or without an id).
    pub skipped: u64,
    pub purged: u64,
    pub errors: Vec<String>,
}

impl FetchReport {
    fn new(run_id: Uuid, scope_id: i64) -> Self {
        Self {
            run_id,
            scope_id,
            attempted: 0,
            inserted: 0,
            skipped: 0,
            purged: 0,
            errors: Vec::new(),
        }
    }

    fn log_entry(&self, status: RunStatus) -> NewOperationLog<'_> {
        NewOperationLog {
            run_id: self.run_id,
            scope_id: self.scope_id,
            run_type: RunType::Fetch,
            status,
            attempted: self.attempted,
            succeeded: self.inserted,
            skipped: self.skipped,
            purged: self.purged,
            errors: &self.errors,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "fetched {} new posts from {} accounts, {} skipped, {} purged, {} errors",
            self.inserted,
            self.attempted,
            self.skipped,
            self.purged,
            self.errors.len()
        )
    }
}

/// Run one fetch cycle for a scope.
///
/// Per-account failures land in `errors` and never stop the batch. A storage
/// failure aborts the run: a `failed` log entry is written when possible and
/// the error is returned. Rows from chunks committed before the failure stay.
#[instrument(skip_all, fields(scope_id, run_id = tracing::field::Empty))]
pub async fn run_fetch_cycle(
    pool: &Pool,
    provider: &dyn PostProvider,
    scope_id: i64,
    options: FetchOptions,
) -> Result<FetchReport, PipelineError> {
    provider.ensure_ready()?;

    let run_id = Uuid::new_v4();
    Span::current().record("run_id", tracing::field::display(run_id));
    let mut report = FetchReport::new(run_id, scope_id);

    match fetch_members_and_purge(pool, provider, &mut report, options).await {
        Ok(()) => {
            db::append_operation_log(pool, &report.log_entry(RunStatus::Succeeded)).await?;
            info!(
                attempted = report.attempted,
                inserted = report.inserted,
                skipped = report.skipped,
                purged = report.purged,
                errors = report.errors.len(),
                "fetch cycle complete"
            );
            Ok(report)
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "fetch cycle aborted");
            report.errors.push(format!("storage: {err:#}"));
            if let Err(log_err) =
                db::append_operation_log(pool, &report.log_entry(RunStatus::Failed)).await
            {
                warn!(?log_err, "could not record failed fetch cycle");
            }
            Err(PipelineError::Storage(err))
        }
    }
}

async fn fetch_members_and_purge(
    pool: &Pool,
    provider: &dyn PostProvider,
    report: &mut FetchReport,
    options: FetchOptions,
) -> Result<()> {
    let scope_id = report.scope_id;
    let now = Utc::now();
    let settings = db::scope_settings_or_default(pool, scope_id, options.defaults).await?;
    let members = db::list_members(pool, scope_id).await?;

    for member in &members {
        report.attempted += 1;
        let posts = match provider.fetch_recent_posts(&member.handle).await {
            Ok(posts) => posts,
            Err(err) => {
                warn!(handle = %member.handle, error = %err, "provider fetch failed; continuing");
                report.errors.push(format!("@{}: {err}", member.handle));
                continue;
            }
        };

        let returned = posts.len() as u64;
        // Age is not checked here; stale rows are removed by the purge below.
        let candidates: Vec<NormalizedPost> = posts
            .into_iter()
            .filter(|p| !p.id.trim().is_empty())
            .collect();
        let inserted = db::insert_posts(
            pool,
            scope_id,
            Some(member.id),
            &candidates,
            now,
            options.chunk_size,
        )
        .await?;
        report.inserted += inserted;
        report.skipped += returned.saturating_sub(inserted);
        debug!(handle = %member.handle, returned, inserted, "member merged");
    }

    let purge = retention::purge_scope(pool, scope_id, settings.retention_days, now).await?;
    report.purged = purge.total();
    Ok(())
}
