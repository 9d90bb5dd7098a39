#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;
use tokio::sync::{Mutex, Notify};

use x_watchbot::db::{self, Pool};
use x_watchbot::model::{NormalizedPost, PostAuthor, PostMetrics, SettingsDefaults};
use x_watchbot::provider::{PostProvider, ProviderError};
use x_watchbot::service::{ServiceOptions, WatchService};
use x_watchbot::translate::{TranslateError, Translation, TranslationRequest, Translator};

pub async fn setup_pool() -> (TempDir, Pool) {
    let td = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}/test.db", td.path().display());
    let pool = db::init_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    (td, pool)
}

pub fn options() -> ServiceOptions {
    ServiceOptions {
        chunk_size: 2,
        defaults: SettingsDefaults {
            fetch_interval_minutes: 0,
            retention_days: 7,
        },
        translate_limit: 10,
        max_translate_attempts: 3,
    }
}

pub fn post(id: &str, author: &str, created_at: DateTime<Utc>) -> NormalizedPost {
    NormalizedPost {
        id: id.to_string(),
        text: format!("text {id}"),
        author: PostAuthor {
            username: author.to_string(),
            name: None,
        },
        created_at,
        lang: Some("en".into()),
        metrics: PostMetrics::default(),
        quoted: None,
    }
}

pub fn recent(id: &str, author: &str) -> NormalizedPost {
    post(id, author, Utc::now() - Duration::minutes(5))
}

/// Provider fake: fixed timelines per handle, a set of failing handles, and
/// an optional gate that holds every call until released.
#[derive(Clone, Default)]
pub struct RecordingProvider {
    timelines: Arc<Mutex<HashMap<String, Vec<NormalizedPost>>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
    unconfigured: bool,
    hold: Option<Arc<Notify>>,
}

impl RecordingProvider {
    pub fn unconfigured() -> Self {
        Self {
            unconfigured: true,
            ..Default::default()
        }
    }

    pub fn held(release: Arc<Notify>) -> Self {
        Self {
            hold: Some(release),
            ..Default::default()
        }
    }

    pub async fn set_timeline(&self, handle: &str, posts: Vec<NormalizedPost>) {
        self.timelines
            .lock()
            .await
            .insert(handle.to_string(), posts);
    }

    pub async fn fail(&self, handle: &str) {
        self.failing.lock().await.insert(handle.to_string());
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl PostProvider for RecordingProvider {
    fn ensure_ready(&self) -> Result<(), ProviderError> {
        if self.unconfigured {
            return Err(ProviderError::NotConfigured("no api key".into()));
        }
        Ok(())
    }

    async fn fetch_recent_posts(
        &self,
        username: &str,
    ) -> Result<Vec<NormalizedPost>, ProviderError> {
        self.calls.lock().await.push(username.to_string());
        if let Some(release) = &self.hold {
            release.notified().await;
        }
        if self.failing.lock().await.contains(username) {
            return Err(ProviderError::RateLimited("slow down".into()));
        }
        Ok(self
            .timelines
            .lock()
            .await
            .get(username)
            .cloned()
            .unwrap_or_default())
    }
}

/// Translator fake: queued outcomes, then `译:<text>` for everything else.
#[derive(Clone, Default)]
pub struct RecordingTranslator {
    responses: Arc<Mutex<VecDeque<Result<Translation, TranslateError>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    unconfigured: bool,
}

impl RecordingTranslator {
    pub fn with_responses(responses: Vec<Result<Translation, TranslateError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            unconfigured: true,
            ..Default::default()
        }
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

pub fn translated(text: &str) -> Translation {
    Translation {
        translated_text: format!("译:{text}"),
        comment_text: Some("评论".into()),
        quoted_translated_text: None,
    }
}

#[async_trait::async_trait]
impl Translator for RecordingTranslator {
    fn ensure_ready(&self) -> Result<(), TranslateError> {
        if self.unconfigured {
            return Err(TranslateError::NotConfigured("no api key".into()));
        }
        Ok(())
    }

    fn target_language(&self) -> &str {
        "zh"
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<Translation, TranslateError> {
        self.calls.lock().await.push(request.original_text.clone());
        let queued = self.responses.lock().await.pop_front();
        queued.unwrap_or_else(|| Ok(translated(&request.original_text)))
    }
}

pub fn service(pool: &Pool, provider: &RecordingProvider, translator: &RecordingTranslator) -> WatchService {
    WatchService::new(
        pool.clone(),
        Arc::new(provider.clone()),
        Arc::new(translator.clone()),
        options(),
    )
}
