//! The post store: set-union insert, purge sweeps, and the translation queue.

use super::model::{PostRow, QueueItem, QueueRow};
use super::{to_millis, Pool};
use crate::model::{FetchedPost, NormalizedPost};
use crate::translate::Translation;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, instrument};

/// Bound parameters per inserted row.
const BINDS_PER_ROW: usize = 9;
/// Oldest SQLite builds cap a statement at 999 host parameters.
const MAX_ROWS_PER_STATEMENT: usize = 999 / BINDS_PER_ROW;

const POST_COLUMNS: &str = "id, scope_id, member_id, tweet_id, author_username, original_text, \
     lang, translated_text, comment_text, quoted_translated_text, created_at, fetched_at, \
     translated_at, translate_attempts, raw_json";

/// Insert posts for a scope as a set union over `(scope_id, tweet_id)`.
///
/// Rows that already exist are left untouched (an existing translation is
/// never clobbered), duplicates inside `posts` collapse to one row, and each
/// chunk is its own statement, so chunk size never changes the outcome.
/// Returns the number of rows actually inserted.
#[instrument(skip_all, fields(scope_id, member_id, candidates = posts.len()))]
pub async fn insert_posts(
    pool: &Pool,
    scope_id: i64,
    member_id: Option<i64>,
    posts: &[NormalizedPost],
    fetched_at: DateTime<Utc>,
    chunk_size: usize,
) -> Result<u64> {
    if posts.is_empty() {
        return Ok(0);
    }
    let rows = posts
        .iter()
        .map(|p| {
            serde_json::to_string(p)
                .map(|raw| (p, raw))
                .with_context(|| format!("failed to serialize post {}", p.id))
        })
        .collect::<Result<Vec<_>>>()?;

    let fetched_at = to_millis(fetched_at);
    let chunk_size = chunk_size.clamp(1, MAX_ROWS_PER_STATEMENT);
    let mut inserted = 0;
    for chunk in rows.chunks(chunk_size) {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO fetched_posts (scope_id, member_id, tweet_id, author_username, \
             original_text, lang, created_at, fetched_at, raw_json) ",
        );
        qb.push_values(chunk, |mut b, (post, raw)| {
            b.push_bind(scope_id)
                .push_bind(member_id)
                .push_bind(post.id.as_str())
                .push_bind(post.author.username.as_str())
                .push_bind(post.text.as_str())
                .push_bind(post.lang.as_deref())
                .push_bind(to_millis(post.created_at))
                .push_bind(fetched_at)
                .push_bind(raw.as_str());
        });
        qb.push(" ON CONFLICT(scope_id, tweet_id) DO NOTHING");
        let res = qb
            .build()
            .execute(pool)
            .await
            .context("failed to insert fetched posts")?;
        inserted += res.rows_affected();
    }
    debug!(inserted, "posts merged");
    Ok(inserted)
}

/// Delete posts created strictly before `cutoff`.
#[instrument(skip_all, fields(scope_id))]
pub async fn purge_posts_created_before(
    pool: &Pool,
    scope_id: i64,
    cutoff: DateTime<Utc>,
) -> Result<u64> {
    let res = sqlx::query("DELETE FROM fetched_posts WHERE scope_id = ? AND created_at < ?")
        .bind(scope_id)
        .bind(to_millis(cutoff))
        .execute(pool)
        .await
        .context("failed to purge expired posts")?;
    Ok(res.rows_affected())
}

/// Delete posts whose member is gone. `NOT IN` over an empty member set is
/// true, so a scope with no members loses every post; NULL owners are matched
/// explicitly because `NULL NOT IN (...)` is never true.
#[instrument(skip_all, fields(scope_id))]
pub async fn purge_orphaned_posts(pool: &Pool, scope_id: i64) -> Result<u64> {
    let res = sqlx::query(
        "DELETE FROM fetched_posts WHERE scope_id = ? AND \
         (member_id IS NULL OR member_id NOT IN \
            (SELECT id FROM watchlist_members WHERE scope_id = ?))",
    )
    .bind(scope_id)
    .bind(scope_id)
    .execute(pool)
    .await
    .context("failed to purge orphaned posts")?;
    Ok(res.rows_affected())
}

/// Oldest-fetched untranslated posts, skipping ones that exhausted
/// `max_attempts` failures (0 means no cap).
#[instrument(skip_all, fields(scope_id, limit))]
pub async fn next_untranslated(
    pool: &Pool,
    scope_id: i64,
    limit: u32,
    max_attempts: u32,
) -> Result<Vec<QueueItem>> {
    let rows = sqlx::query_as::<_, QueueRow>(
        "SELECT id, tweet_id, original_text, lang, raw_json FROM fetched_posts \
         WHERE scope_id = ? AND translated_at IS NULL \
           AND (? = 0 OR translate_attempts < ?) \
         ORDER BY fetched_at ASC, id ASC \
         LIMIT ?",
    )
    .bind(scope_id)
    .bind(i64::from(max_attempts))
    .bind(i64::from(max_attempts))
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Persist one translation in its own transaction. Returns false when the
/// post was already translated or purged meanwhile.
#[instrument(skip_all, fields(post_id))]
pub async fn save_translation(
    pool: &Pool,
    post_id: i64,
    translation: &Translation,
    at: DateTime<Utc>,
) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let res = sqlx::query(
        "UPDATE fetched_posts SET translated_text = ?, comment_text = ?, \
             quoted_translated_text = ?, translated_at = ?, last_translate_error = NULL \
         WHERE id = ? AND translated_at IS NULL",
    )
    .bind(&translation.translated_text)
    .bind(translation.comment_text.as_deref())
    .bind(translation.quoted_translated_text.as_deref())
    .bind(to_millis(at))
    .bind(post_id)
    .execute(&mut *tx)
    .await
    .context("failed to persist translation")?;
    tx.commit().await?;
    Ok(res.rows_affected() > 0)
}

/// Mark a post processed without a translation (already in the target language).
#[instrument(skip_all, fields(post_id))]
pub async fn mark_translation_skipped(pool: &Pool, post_id: i64, at: DateTime<Utc>) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE fetched_posts SET translated_at = ? WHERE id = ? AND translated_at IS NULL",
    )
    .bind(to_millis(at))
    .bind(post_id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all, fields(post_id))]
pub async fn record_translation_failure(pool: &Pool, post_id: i64, error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE fetched_posts SET translate_attempts = translate_attempts + 1, \
             last_translate_error = ? \
         WHERE id = ? AND translated_at IS NULL",
    )
    .bind(error)
    .bind(post_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all, fields(scope_id))]
pub async fn count_untranslated(pool: &Pool, scope_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM fetched_posts WHERE scope_id = ? AND translated_at IS NULL",
    )
    .bind(scope_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

#[instrument(skip_all, fields(scope_id))]
pub async fn count_posts(pool: &Pool, scope_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fetched_posts WHERE scope_id = ?")
        .bind(scope_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Newest posts first. `page` is 1-based.
#[instrument(skip_all, fields(scope_id, page, per_page))]
pub async fn list_posts(
    pool: &Pool,
    scope_id: i64,
    page: u32,
    per_page: u32,
) -> Result<Vec<FetchedPost>> {
    let offset = i64::from(page.max(1) - 1) * i64::from(per_page);
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM fetched_posts WHERE scope_id = ? \
         ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
    );
    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(scope_id)
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(FetchedPost::try_from).collect()
}
