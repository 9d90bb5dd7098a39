use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static HANDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_]{1,15}$").unwrap());

/// Normalize a user-entered handle: trim, drop a leading `@`, lowercase.
/// Returns `None` when the result is not a valid X/Twitter handle.
pub fn normalize_handle(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let handle = trimmed.strip_prefix('@').unwrap_or(trimmed).to_lowercase();
    HANDLE_RE.is_match(&handle).then_some(handle)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Fetch,
    Translate,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Fetch => "fetch",
            RunType::Translate => "translate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fetch" => Some(RunType::Fetch),
            "translate" => Some(RunType::Translate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(RunStatus::Succeeded),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostAuthor {
    pub username: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostMetrics {
    pub likes: i64,
    pub retweets: i64,
    pub replies: i64,
    pub quotes: i64,
    pub views: Option<i64>,
}

/// A post as returned by the provider, after normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedPost {
    pub id: String,
    pub text: String,
    pub author: PostAuthor,
    pub created_at: DateTime<Utc>,
    pub lang: Option<String>,
    pub metrics: PostMetrics,
    pub quoted: Option<Box<NormalizedPost>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistMember {
    pub id: i64,
    pub scope_id: i64,
    pub handle: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPost {
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
    pub created_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub translated_at: Option<DateTime<Utc>>,
    pub translate_attempts: i64,
    pub post: NormalizedPost,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeSettings {
    pub scope_id: i64,
    /// 0 disables scheduled fetching.
    pub fetch_interval_minutes: u32,
    /// 0 disables the age-based purge.
    pub retention_days: u32,
}

/// Settings applied to scopes that never saved their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsDefaults {
    pub fetch_interval_minutes: u32,
    pub retention_days: u32,
}

impl SettingsDefaults {
    pub fn for_scope(&self, scope_id: i64) -> ScopeSettings {
        ScopeSettings {
            scope_id,
            fetch_interval_minutes: self.fetch_interval_minutes,
            retention_days: self.retention_days,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub id: i64,
    pub run_id: Uuid,
    pub scope_id: i64,
    pub run_type: RunType,
    pub status: RunStatus,
    pub attempted: i64,
    pub succeeded: i64,
    pub skipped: i64,
    pub purged: i64,
    pub error_count: i64,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One page of stored posts plus the scope's untranslated badge count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostsPage {
    pub posts: Vec<FetchedPost>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub untranslated: i64,
}
