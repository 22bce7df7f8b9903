use thiserror::Error;

use crate::status::ReviewState;

/// Errors produced by the moderation core.
///
/// `Clone`: one coalesced scan failure is delivered to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModerationError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transient provider error from {provider}: {message}")]
    ProviderTransient { provider: String, message: String },

    #[error("Fatal provider error from {provider}: {message}")]
    ProviderFatal { provider: String, message: String },

    #[error("Moderation temporarily unavailable after {attempts} provider attempts")]
    ScanUnavailable { attempts: usize },

    #[error("Cache backend degraded: {0}")]
    CacheDegraded(String),

    #[error("Review conflict: record {fingerprint} is {state}, not pending")]
    ReviewConflict { fingerprint: String, state: ReviewState },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ModerationError {
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderTransient {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn fatal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderFatal {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether a failed provider attempt may be retried against the same provider.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderTransient { .. })
    }
}

pub type Result<T> = std::result::Result<T, ModerationError>;
