//! Configuration loader and validator for the watchlist pipeline.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Environment variable that supplies the provider key when the YAML leaves it blank.
pub const PROVIDER_KEY_ENV: &str = "PROVIDER_API_KEY";
/// Environment variable that supplies the translator key when the YAML leaves it blank.
pub const TRANSLATOR_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub provider: Provider,
    pub translator: Translator,
}

/// App-level settings and pipeline defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// How often the daemon reconciles tickers with stored scope settings.
    pub settings_refresh_secs: u64,
    /// Used for scopes that have no settings row yet.
    pub default_fetch_interval_minutes: u32,
    pub default_retention_days: u32,
    pub insert_chunk_size: usize,
    pub translate_batch_limit: u32,
    /// 0 keeps retrying a failing post forever.
    pub max_translate_attempts: u32,
}

/// Social-data provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provider {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub timeout_secs: u64,
}

/// Translation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Translator {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub target_language: String,
    pub timeout_secs: u64,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins over the file under `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/watchbot.db", self.app.data_dir))
    }

    pub fn provider_api_key(&self) -> Option<String> {
        key_or_env(&self.provider.api_key, PROVIDER_KEY_ENV)
    }

    pub fn translator_api_key(&self) -> Option<String> {
        key_or_env(&self.translator.api_key, TRANSLATOR_KEY_ENV)
    }
}

fn key_or_env(value: &str, var: &str) -> Option<String> {
    let value = value.trim();
    if !value.is_empty() {
        return Some(value.to_string());
    }
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
///
/// API keys may be empty here: a missing key is reported when a run starts,
/// so the daemon can still serve settings and logs without credentials.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.settings_refresh_secs == 0 {
        return Err(ConfigError::Invalid("app.settings_refresh_secs must be > 0"));
    }
    if cfg.app.insert_chunk_size == 0 {
        return Err(ConfigError::Invalid("app.insert_chunk_size must be > 0"));
    }
    if cfg.app.translate_batch_limit == 0 {
        return Err(ConfigError::Invalid("app.translate_batch_limit must be > 0"));
    }

    if cfg.provider.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("provider.base_url must be non-empty"));
    }
    if cfg.provider.timeout_secs == 0 {
        return Err(ConfigError::Invalid("provider.timeout_secs must be > 0"));
    }

    if cfg.translator.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("translator.base_url must be non-empty"));
    }
    if cfg.translator.model.trim().is_empty() {
        return Err(ConfigError::Invalid("translator.model must be non-empty"));
    }
    if cfg.translator.target_language.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "translator.target_language must be non-empty",
        ));
    }
    if cfg.translator.timeout_secs == 0 {
        return Err(ConfigError::Invalid("translator.timeout_secs must be > 0"));
    }

    Ok(())
}

/// Returns the example YAML shipped with the project.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  settings_refresh_secs: 60
  default_fetch_interval_minutes: 30
  default_retention_days: 7
  insert_chunk_size: 100
  translate_batch_limit: 10
  max_translate_attempts: 5

provider:
  base_url: "https://api.twitterapi.io/"
  api_key: "YOUR_PROVIDER_API_KEY"
  timeout_secs: 30

translator:
  base_url: "https://api.openai.com/"
  api_key: ""
  model: "gpt-4o-mini"
  target_language: "zh"
  timeout_secs: 60
"#
}
