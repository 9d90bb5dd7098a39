//! Translation queue runner: oldest-fetched untranslated posts first, one
//! backend call and one commit per item.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn, Span};
use uuid::Uuid;

use crate::db::{self, NewOperationLog, Pool, QueueItem};
use crate::error::PipelineError;
use crate::model::{RunStatus, RunType};
use crate::translate::{TranslationRequest, Translator};

#[derive(Debug, Clone, Copy)]
pub struct TranslateOptions {
    pub limit: u32,
    /// 0 keeps retrying failing posts forever.
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslateReport {
    pub run_id: Uuid,
    pub scope_id: i64,
    pub attempted: u64,
    pub translated: u64,
    /// Already in the target language, empty, or handled by a concurrent run.
    pub skipped: u64,
    pub errors: Vec<String>,
    /// Untranslated posts left in the scope, counted after the batch.
    pub remaining: i64,
}

impl TranslateReport {
    fn log_entry(&self, status: RunStatus) -> NewOperationLog<'_> {
        NewOperationLog {
            run_id: self.run_id,
            scope_id: self.scope_id,
            run_type: RunType::Translate,
            status,
            attempted: self.attempted,
            succeeded: self.translated,
            skipped: self.skipped,
            purged: 0,
            errors: &self.errors,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "translated {} of {} posts, {} skipped, {} errors, {} remaining",
            self.translated,
            self.attempted,
            self.skipped,
            self.errors.len(),
            self.remaining
        )
    }
}

#[instrument(skip_all, fields(scope_id, run_id = tracing::field::Empty))]
pub async fn run_translate(
    pool: &Pool,
    translator: &dyn Translator,
    scope_id: i64,
    options: TranslateOptions,
) -> Result<TranslateReport, PipelineError> {
    translator.ensure_ready()?;

    let run_id = Uuid::new_v4();
    Span::current().record("run_id", tracing::field::display(run_id));
    let mut report = TranslateReport {
        run_id,
        scope_id,
        attempted: 0,
        translated: 0,
        skipped: 0,
        errors: Vec::new(),
        remaining: 0,
    };

    match translate_batch(pool, translator, &mut report, options).await {
        Ok(()) => {
            db::append_operation_log(pool, &report.log_entry(RunStatus::Succeeded)).await?;
            info!(
                attempted = report.attempted,
                translated = report.translated,
                skipped = report.skipped,
                errors = report.errors.len(),
                remaining = report.remaining,
                "translate run complete"
            );
            Ok(report)
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "translate run aborted");
            report.errors.push(format!("storage: {err:#}"));
            if let Err(log_err) =
                db::append_operation_log(pool, &report.log_entry(RunStatus::Failed)).await
            {
                warn!(?log_err, "could not record failed translate run");
            }
            Err(PipelineError::Storage(err))
        }
    }
}

async fn translate_batch(
    pool: &Pool,
    translator: &dyn Translator,
    report: &mut TranslateReport,
    options: TranslateOptions,
) -> Result<()> {
    let items =
        db::next_untranslated(pool, report.scope_id, options.limit, options.max_attempts).await?;

    for item in items {
        report.attempted += 1;
        if !needs_translation(&item, translator.target_language()) {
            if db::mark_translation_skipped(pool, item.id, Utc::now()).await? {
                report.skipped += 1;
            }
            continue;
        }

        let request = TranslationRequest {
            original_text: item.original_text.clone(),
            quoted_text: item.quoted_text.clone(),
        };
        match translator.translate(&request).await {
            Ok(translation) => {
                if db::save_translation(pool, item.id, &translation, Utc::now()).await? {
                    report.translated += 1;
                } else {
                    report.skipped += 1;
                }
            }
            Err(err) => {
                warn!(tweet_id = %item.tweet_id, error = %err, "translation failed; continuing");
                db::record_translation_failure(pool, item.id, &err.to_string()).await?;
                report.errors.push(format!("post {}: {err}", item.tweet_id));
            }
        }
    }

    // Fresh count: a concurrent fetch may have queued more posts meanwhile.
    report.remaining = db::count_untranslated(pool, report.scope_id).await?;
    Ok(())
}

fn needs_translation(item: &QueueItem, target_language: &str) -> bool {
    // The quoted post has its own language and still needs its translation.
    if item.quoted_text.is_some() {
        return true;
    }
    if item.original_text.trim().is_empty() {
        return false;
    }
    let primary = |tag: &str| tag.split(['-', '_']).next().unwrap_or("").to_ascii_lowercase();
    match item.lang.as_deref() {
        Some(lang) => primary(lang) != primary(target_language),
        None => true,
    }
}
