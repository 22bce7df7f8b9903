//! Provider construction from configuration.

use std::sync::Arc;

use tracing::{info, warn};

use super::{MockProvider, ModerationProvider};
#[cfg(feature = "network")]
use super::{HiveConfig, HiveProvider, ModerentConfig, ModerentProvider};
use crate::error::{ModerationError, Result};

/// Configuration for creating a single provider.
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    /// Moderent scan API
    #[cfg(feature = "network")]
    Moderent(ModerentConfig),

    /// Hive moderation API
    #[cfg(feature = "network")]
    Hive(HiveConfig),

    /// Mock provider (testing only)
    Mock { name: String },
}

/// The primary/fallback pair driven by the retry controller.
#[derive(Clone)]
pub struct ProviderPair {
    pub primary: Arc<dyn ModerationProvider>,
    pub fallback: Arc<dyn ModerationProvider>,
}

impl ProviderPair {
    /// Two independent mock providers named `primary` and `fallback`.
    pub fn mock() -> Self {
        Self {
            primary: Arc::new(MockProvider::new("primary")),
            fallback: Arc::new(MockProvider::new("fallback")),
        }
    }
}

/// Factory for creating moderation providers.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a provider from configuration.
    pub fn create(config: ProviderConfig) -> Result<Arc<dyn ModerationProvider>> {
        match config {
            #[cfg(feature = "network")]
            ProviderConfig::Moderent(moderent_config) => {
                Ok(Arc::new(ModerentProvider::new(moderent_config)?))
            }
            #[cfg(feature = "network")]
            ProviderConfig::Hive(hive_config) => Ok(Arc::new(HiveProvider::new(hive_config)?)),
            ProviderConfig::Mock { name } => Ok(Arc::new(MockProvider::new(name))),
        }
    }

    /// Build the primary (Moderent) and fallback (Hive) providers from the
    /// environment.
    ///
    /// A provider whose API key is missing is replaced by a mock when
    /// `allow_mock` is set; otherwise construction fails.
    pub fn pair_from_env(allow_mock: bool) -> Result<ProviderPair> {
        let primary = Self::primary_from_env(allow_mock)?;
        let fallback = Self::fallback_from_env(allow_mock)?;

        info!(
            primary = %primary.provider_id(),
            fallback = %fallback.provider_id(),
            "Moderation providers configured"
        );

        Ok(ProviderPair { primary, fallback })
    }

    fn primary_from_env(allow_mock: bool) -> Result<Arc<dyn ModerationProvider>> {
        #[cfg(feature = "network")]
        match ModerentConfig::from_env() {
            Ok(config) => return Self::create(ProviderConfig::Moderent(config)),
            Err(e) if !allow_mock => return Err(e),
            Err(e) => warn!(error = %e, "Primary provider not configured, using mock"),
        }

        Self::mock_or_fail("primary", allow_mock)
    }

    fn fallback_from_env(allow_mock: bool) -> Result<Arc<dyn ModerationProvider>> {
        #[cfg(feature = "network")]
        match HiveConfig::from_env() {
            Ok(config) => return Self::create(ProviderConfig::Hive(config)),
            Err(e) if !allow_mock => return Err(e),
            Err(e) => warn!(error = %e, "Fallback provider not configured, using mock"),
        }

        Self::mock_or_fail("fallback", allow_mock)
    }

    fn mock_or_fail(name: &str, allow_mock: bool) -> Result<Arc<dyn ModerationProvider>> {
        if allow_mock {
            Self::create(ProviderConfig::Mock { name: name.into() })
        } else {
            Err(ModerationError::Configuration(format!(
                "No {name} provider available and mock providers are disabled"
            )))
        }
    }
}
