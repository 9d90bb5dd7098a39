use super::model::MemberRow;
use super::to_millis;
use crate::model::{normalize_handle, ScopeSettings, SettingsDefaults, WatchlistMember};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, warn};

pub type Pool = SqlitePool;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CONNECTIONS: u32 = 5;

/// Watchlist edits distinguish bad input from storage failures.
#[derive(Debug, Error)]
pub enum MemberError {
    #[error("invalid handle {0:?}")]
    InvalidHandle(String),
    #[error("@{0} is already on the watchlist")]
    Duplicate(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    // WAL with full sync; the busy timeout lets concurrent writers queue instead of failing.
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {normalized}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .context("failed to open database")?;
    Ok(pool)
}

/// Normalize a file-backed SQLite URL to `sqlite://<path>[?query]`, expanding
/// `~/` against `$HOME` and creating the parent directory. Other schemes and
/// in-memory databases pass through unchanged.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (file, query) = match rest.split_once('?') {
        Some((file, query)) => (file, Some(query)),
        None => (rest, None),
    };
    if file.is_empty() {
        return url.to_string();
    }

    let path = expand_home(file);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(dir) {
            warn!(dir = %dir.display(), %err, "could not create database directory");
        }
    }

    let mut out = format!("sqlite://{}", path.display());
    if let Some(query) = query {
        out.push('?');
        out.push_str(query);
    }
    out
}

fn expand_home(file: &str) -> PathBuf {
    match (file.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rel), Some(home)) => PathBuf::from(home).join(rel),
        _ => PathBuf::from(file),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Add an account to a scope's watchlist. The handle is normalized first.
#[instrument(skip_all, fields(scope_id))]
pub async fn add_member(
    pool: &Pool,
    scope_id: i64,
    raw_handle: &str,
    note: Option<&str>,
) -> Result<WatchlistMember, MemberError> {
    let handle = normalize_handle(raw_handle)
        .ok_or_else(|| MemberError::InvalidHandle(raw_handle.to_string()))?;
    let note = note.map(str::trim).filter(|n| !n.is_empty());
    let row = sqlx::query_as::<_, MemberRow>(
        "INSERT INTO watchlist_members (scope_id, handle, note, created_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT(scope_id, handle) DO NOTHING \
         RETURNING id, scope_id, handle, note, created_at",
    )
    .bind(scope_id)
    .bind(&handle)
    .bind(note)
    .bind(to_millis(Utc::now()))
    .fetch_optional(pool)
    .await
    .context("failed to insert watchlist member")?;
    let Some(row) = row else {
        return Err(MemberError::Duplicate(handle));
    };
    Ok(WatchlistMember::try_from(row)?)
}

/// Remove a member. Its posts stay until the next orphan purge.
#[instrument(skip_all, fields(scope_id))]
pub async fn remove_member(
    pool: &Pool,
    scope_id: i64,
    raw_handle: &str,
) -> Result<bool, MemberError> {
    let handle = normalize_handle(raw_handle)
        .ok_or_else(|| MemberError::InvalidHandle(raw_handle.to_string()))?;
    let res = sqlx::query("DELETE FROM watchlist_members WHERE scope_id = ? AND handle = ?")
        .bind(scope_id)
        .bind(&handle)
        .execute(pool)
        .await
        .with_context(|| format!("failed to remove @{handle}"))?;
    Ok(res.rows_affected() > 0)
}

/// Members of a scope in a stable order (insertion order).
#[instrument(skip_all, fields(scope_id))]
pub async fn list_members(pool: &Pool, scope_id: i64) -> Result<Vec<WatchlistMember>> {
    let rows = sqlx::query_as::<_, MemberRow>(
        "SELECT id, scope_id, handle, note, created_at FROM watchlist_members \
         WHERE scope_id = ? ORDER BY id ASC",
    )
    .bind(scope_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(WatchlistMember::try_from).collect()
}

/// Every scope that has members or stored settings.
#[instrument(skip_all)]
pub async fn list_known_scopes(pool: &Pool) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT scope_id FROM watchlist_members UNION SELECT scope_id FROM scope_settings ORDER BY 1",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Stored settings for a scope, if the scope has ever saved any.
#[instrument(skip_all, fields(scope_id))]
pub async fn get_scope_settings(pool: &Pool, scope_id: i64) -> Result<Option<ScopeSettings>> {
    let row: Option<(i64, i64)> = sqlx::query_as(
        "SELECT fetch_interval_minutes, retention_days FROM scope_settings WHERE scope_id = ?",
    )
    .bind(scope_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(interval, retention)| ScopeSettings {
        scope_id,
        fetch_interval_minutes: u32::try_from(interval).unwrap_or(0),
        retention_days: u32::try_from(retention).unwrap_or(0),
    }))
}

pub async fn scope_settings_or_default(
    pool: &Pool,
    scope_id: i64,
    defaults: SettingsDefaults,
) -> Result<ScopeSettings> {
    Ok(get_scope_settings(pool, scope_id)
        .await?
        .unwrap_or_else(|| defaults.for_scope(scope_id)))
}

#[instrument(skip_all, fields(scope_id = settings.scope_id))]
pub async fn upsert_scope_settings(pool: &Pool, settings: &ScopeSettings) -> Result<()> {
    sqlx::query(
        "INSERT INTO scope_settings (scope_id, fetch_interval_minutes, retention_days, updated_at) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT(scope_id) DO UPDATE SET \
             fetch_interval_minutes = excluded.fetch_interval_minutes, \
             retention_days = excluded.retention_days, \
             updated_at = excluded.updated_at",
    )
    .bind(settings.scope_id)
    .bind(i64::from(settings.fetch_interval_minutes))
    .bind(i64::from(settings.retention_days))
    .bind(to_millis(Utc::now()))
    .execute(pool)
    .await
    .context("failed to persist scope settings")?;
    Ok(())
}
