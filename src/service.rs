//! Operations exposed to callers (the CLI, the scheduler): "fetch now",
//! "translate now", settings, paginated posts, the run log and the watchlist.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config;
use crate::db::{self, Pool};
use crate::error::PipelineError;
use crate::fetch::{run_fetch_cycle, FetchOptions, FetchReport};
use crate::model::{OperationLogEntry, PostsPage, ScopeSettings, SettingsDefaults, WatchlistMember};
use crate::provider::{HttpProvider, PostProvider};
use crate::translate::{OpenAiTranslator, Translator};
use crate::translate_queue::{run_translate, TranslateOptions, TranslateReport};

pub const MAX_FETCH_INTERVAL_MINUTES: u32 = 24 * 60;
pub const MAX_RETENTION_DAYS: u32 = 3650;
pub const MAX_PER_PAGE: u32 = 200;

#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    pub chunk_size: usize,
    pub defaults: SettingsDefaults,
    pub translate_limit: u32,
    pub max_translate_attempts: u32,
}

impl From<&config::App> for ServiceOptions {
    fn from(app: &config::App) -> Self {
        Self {
            chunk_size: app.insert_chunk_size,
            defaults: SettingsDefaults {
                fetch_interval_minutes: app.default_fetch_interval_minutes,
                retention_days: app.default_retention_days,
            },
            translate_limit: app.translate_batch_limit,
            max_translate_attempts: app.max_translate_attempts,
        }
    }
}

pub struct WatchService {
    pool: Pool,
    provider: Arc<dyn PostProvider>,
    translator: Arc<dyn Translator>,
    options: ServiceOptions,
}

impl WatchService {
    pub fn new(
        pool: Pool,
        provider: Arc<dyn PostProvider>,
        translator: Arc<dyn Translator>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            pool,
            provider,
            translator,
            options,
        }
    }

    /// Open the database, apply migrations and build the HTTP clients.
    pub async fn from_config(cfg: &config::Config) -> anyhow::Result<Self> {
        let pool = db::init_pool(&cfg.database_url()).await?;
        db::run_migrations(&pool).await?;
        let provider = HttpProvider::from_config(cfg)?;
        let translator = OpenAiTranslator::from_config(cfg)?;
        Ok(Self::new(
            pool,
            Arc::new(provider),
            Arc::new(translator),
            ServiceOptions::from(&cfg.app),
        ))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn options(&self) -> ServiceOptions {
        self.options
    }

    /// One synchronous fetch cycle. Not gated against a scheduled run for the
    /// same scope: concurrent inserts are a set union.
    pub async fn fetch_now(&self, scope_id: i64) -> Result<FetchReport, PipelineError> {
        let options = FetchOptions {
            chunk_size: self.options.chunk_size,
            defaults: self.options.defaults,
        };
        run_fetch_cycle(&self.pool, self.provider.as_ref(), scope_id, options).await
    }

    /// One translation batch; `limit` falls back to the configured batch size.
    pub async fn translate_now(
        &self,
        scope_id: i64,
        limit: Option<u32>,
    ) -> Result<TranslateReport, PipelineError> {
        let limit = limit.unwrap_or(self.options.translate_limit);
        if limit == 0 {
            return Err(PipelineError::Invalid("limit must be > 0".into()));
        }
        let options = TranslateOptions {
            limit,
            max_attempts: self.options.max_translate_attempts,
        };
        run_translate(&self.pool, self.translator.as_ref(), scope_id, options).await
    }

    pub async fn settings(&self, scope_id: i64) -> Result<ScopeSettings, PipelineError> {
        Ok(db::scope_settings_or_default(&self.pool, scope_id, self.options.defaults).await?)
    }

    /// Validate and persist. Rescheduling is the scheduler's job; see
    /// `Scheduler::update_settings`.
    #[instrument(skip_all, fields(scope_id = settings.scope_id))]
    pub async fn update_settings(
        &self,
        settings: ScopeSettings,
    ) -> Result<ScopeSettings, PipelineError> {
        validate_settings(&settings)?;
        db::upsert_scope_settings(&self.pool, &settings).await?;
        info!(
            interval_minutes = settings.fetch_interval_minutes,
            retention_days = settings.retention_days,
            "settings saved"
        );
        Ok(settings)
    }

    pub async fn posts(
        &self,
        scope_id: i64,
        page: u32,
        per_page: u32,
    ) -> Result<PostsPage, PipelineError> {
        if page == 0 || per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(PipelineError::Invalid(format!(
                "page must be >= 1 and per_page within 1..={MAX_PER_PAGE}"
            )));
        }
        let posts = db::list_posts(&self.pool, scope_id, page, per_page).await?;
        let total = db::count_posts(&self.pool, scope_id).await?;
        let untranslated = db::count_untranslated(&self.pool, scope_id).await?;
        Ok(PostsPage {
            posts,
            page,
            per_page,
            total,
            untranslated,
        })
    }

    pub async fn operation_logs(
        &self,
        scope_id: i64,
        limit: u32,
    ) -> Result<Vec<OperationLogEntry>, PipelineError> {
        Ok(db::list_operation_logs(&self.pool, scope_id, limit).await?)
    }

    pub async fn add_member(
        &self,
        scope_id: i64,
        handle: &str,
        note: Option<&str>,
    ) -> Result<WatchlistMember, PipelineError> {
        Ok(db::add_member(&self.pool, scope_id, handle, note).await?)
    }

    pub async fn remove_member(&self, scope_id: i64, handle: &str) -> Result<bool, PipelineError> {
        Ok(db::remove_member(&self.pool, scope_id, handle).await?)
    }

    pub async fn members(&self, scope_id: i64) -> Result<Vec<WatchlistMember>, PipelineError> {
        Ok(db::list_members(&self.pool, scope_id).await?)
    }
}

pub fn validate_settings(settings: &ScopeSettings) -> Result<(), PipelineError> {
    if settings.fetch_interval_minutes > MAX_FETCH_INTERVAL_MINUTES {
        return Err(PipelineError::Invalid(format!(
            "fetch interval must be within 0..={MAX_FETCH_INTERVAL_MINUTES} minutes"
        )));
    }
    if settings.retention_days > MAX_RETENTION_DAYS {
        return Err(PipelineError::Invalid(format!(
            "retention must be within 0..={MAX_RETENTION_DAYS} days"
        )));
    }
    Ok(())
}
