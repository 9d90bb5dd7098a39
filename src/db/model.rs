//! Row models returned by the repositories.
//!
//! Keep these structs focused on what the queries return. Conversions into
//! domain types live here so callers never see raw millisecond columns.

use anyhow::{anyhow, Context, Result};
use uuid::Uuid;

use super::from_millis;
use crate::model::{
    FetchedPost, NormalizedPost, OperationLogEntry, RunStatus, RunType, WatchlistMember,
};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MemberRow {
    pub id: i64,
    pub scope_id: i64,
    pub handle: String,
    pub note: Option<String>,
    pub created_at: i64,
}

impl TryFrom<MemberRow> for WatchlistMember {
    type Error = anyhow::Error;

    fn try_from(row: MemberRow) -> Result<Self> {
        let created_at = from_millis(row.created_at)
            .with_context(|| format!("member {} has a bad created_at", row.id))?;
        Ok(WatchlistMember {
            id: row.id,
            scope_id: row.scope_id,
            handle: row.handle,
            note: row.note,
            created_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: i64,
    pub scope_id: i64,
    pub member_id: Option<i64>,
    pub tweet_id: String,
    pub author_username: String,
    pub original_text: String,
    pub lang: Option<String>,
    pub translated_text: Option<String>,
    pub comment_text: Option<String>,
    pub quoted_translated_text: Option<String>,
    pub created_at: i64,
    pub fetched_at: i64,
    pub translated_at: Option<i64>,
    pub translate_attempts: i64,
    pub raw_json: String,
}

impl TryFrom<PostRow> for FetchedPost {
    type Error = anyhow::Error;

    fn try_from(row: PostRow) -> Result<Self> {
        let post: NormalizedPost = serde_json::from_str(&row.raw_json)
            .with_context(|| format!("post {} has corrupt raw_json", row.id))?;
        let bad_time = || format!("post {} has a bad timestamp", row.id);
        let created_at = from_millis(row.created_at).with_context(bad_time)?;
        let fetched_at = from_millis(row.fetched_at).with_context(bad_time)?;
        let translated_at = row
            .translated_at
            .map(from_millis)
            .transpose()
            .with_context(bad_time)?;
        Ok(FetchedPost {
            id: row.id,
            scope_id: row.scope_id,
            member_id: row.member_id,
            tweet_id: row.tweet_id,
            author_username: row.author_username,
            original_text: row.original_text,
            lang: row.lang,
            translated_text: row.translated_text,
            comment_text: row.comment_text,
            quoted_translated_text: row.quoted_translated_text,
            created_at,
            fetched_at,
            translated_at,
            translate_attempts: row.translate_attempts,
            post,
        })
    }
}

/// Untranslated post slice handed to the translation queue runner.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: i64,
    pub tweet_id: String,
    pub original_text: String,
    pub lang: Option<String>,
    pub quoted_text: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct QueueRow {
    pub id: i64,
    pub tweet_id: String,
    pub original_text: String,
    pub lang: Option<String>,
    pub raw_json: String,
}

impl From<QueueRow> for QueueItem {
    fn from(row: QueueRow) -> Self {
        // A corrupt snapshot only loses the quoted text; the item is still translatable.
        let quoted_text = serde_json::from_str::<NormalizedPost>(&row.raw_json)
            .ok()
            .and_then(|p| p.quoted)
            .map(|q| q.text)
            .filter(|t| !t.trim().is_empty());
        QueueItem {
            id: row.id,
            tweet_id: row.tweet_id,
            original_text: row.original_text,
            lang: row.lang,
            quoted_text,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OperationLogRow {
    pub id: i64,
    pub run_id: String,
    pub scope_id: i64,
    pub run_type: String,
    pub status: String,
    pub attempted: i64,
    pub succeeded: i64,
    pub skipped: i64,
    pub purged: i64,
    pub error_count: i64,
    pub errors_json: String,
    pub created_at: i64,
}

impl TryFrom<OperationLogRow> for OperationLogEntry {
    type Error = anyhow::Error;

    fn try_from(row: OperationLogRow) -> Result<Self> {
        let run_type = RunType::parse(&row.run_type)
            .ok_or_else(|| anyhow!("log {} has unknown run type {}", row.id, row.run_type))?;
        let status = RunStatus::parse(&row.status)
            .ok_or_else(|| anyhow!("log {} has unknown status {}", row.id, row.status))?;
        let run_id = Uuid::parse_str(&row.run_id)
            .with_context(|| format!("log {} has invalid run id", row.id))?;
        let errors: Vec<String> = serde_json::from_str(&row.errors_json).unwrap_or_default();
        Ok(OperationLogEntry {
            id: row.id,
            run_id,
            scope_id: row.scope_id,
            run_type,
            status,
            attempted: row.attempted,
            succeeded: row.succeeded,
            skipped: row.skipped,
            purged: row.purged,
            error_count: row.error_count,
            errors,
            created_at: from_millis(row.created_at)
                .with_context(|| format!("log {} has a bad created_at", row.id))?,
        })
    }
}
