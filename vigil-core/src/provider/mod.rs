//! Content classification providers.
//!
//! Every external classifier is wrapped in a [`ModerationProvider`] that
//! normalizes its own wire format into a [`RawScan`]: category label to
//! confidence in `[0.0, 1.0]`, plus the id of the provider that produced it.
//!
//! - `ModerentProvider` - primary classifier
//! - `HiveProvider` - fallback classifier
//! - `MockProvider` - scriptable classifier for tests and local development

mod factory;
#[cfg(feature = "network")]
mod hive;
#[cfg(feature = "network")]
mod http_client;
mod mock;
#[cfg(feature = "network")]
mod moderent;

pub use factory::{ProviderConfig, ProviderFactory, ProviderPair};
#[cfg(feature = "network")]
pub use hive::{HiveConfig, HiveProvider};
pub use mock::{MockOutcome, MockProvider};
#[cfg(feature = "network")]
pub use moderent::{ModerentConfig, ModerentProvider};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Categories requested from every classifier.
pub const DEFAULT_CATEGORIES: &[&str] = &["nsfw", "violence", "hate_speech"];

/// Trait for external content classifiers.
///
/// Implementations must be thread-safe (`Send + Sync`). A single call is one
/// attempt: retries, deadlines and fallback are handled by the caller.
/// Failures must be reported as `ProviderTransient` (worth retrying) or
/// `ProviderFatal` (the same request will keep failing).
#[async_trait]
pub trait ModerationProvider: Send + Sync {
    /// Classify raw image bytes.
    async fn scan(&self, image: &[u8]) -> Result<RawScan>;

    /// Identifies the provider for audit records and decisions.
    fn provider_id(&self) -> ProviderId;
}

/// Identifies the source of a moderation decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Moderent scan API (primary)
    Moderent,
    /// Hive moderation API (fallback)
    Hive,
    /// Human moderator resolution
    ManualReview,
    /// Mock classifier (NOT a real content check)
    Mock { name: String },
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Moderent => write!(f, "moderent"),
            Self::Hive => write!(f, "hive"),
            Self::ManualReview => write!(f, "manual_review"),
            Self::Mock { name } => write!(f, "mock:{name}"),
        }
    }
}

/// Provider output in the common intermediate shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawScan {
    /// Provider that produced the scores
    pub provider: ProviderId,
    /// Category label -> confidence in [0.0, 1.0]
    pub scores: BTreeMap<String, f64>,
}

impl RawScan {
    pub fn new(provider: ProviderId, scores: BTreeMap<String, f64>) -> Self {
        Self { provider, scores }
    }

    /// Highest confidence across all categories (0.0 when empty).
    pub fn max_score(&self) -> f64 {
        self.scores.values().copied().fold(0.0, f64::max)
    }
}

/// Clamp a provider score into [0.0, 1.0]; NaN becomes 0.0.
pub(crate) fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
