use thiserror::Error;

use crate::db::MemberError;
use crate::provider::ProviderError;
use crate::translate::TranslateError;

/// Whole-run failures. Per-account and per-item failures are never reported
/// through this type; they are returned as data in the run report.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Raised before any I/O, e.g. a missing API key.
    #[error("configuration error: {0}")]
    Config(String),
    /// Rejected caller input, e.g. an out-of-range setting.
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<ProviderError> for PipelineError {
    fn from(err: ProviderError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

impl From<TranslateError> for PipelineError {
    fn from(err: TranslateError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

impl From<MemberError> for PipelineError {
    fn from(err: MemberError) -> Self {
        match err {
            MemberError::Storage(err) => PipelineError::Storage(err),
            other => PipelineError::Invalid(other.to_string()),
        }
    }
}
