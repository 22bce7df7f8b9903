//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use vigil_core::{ModerationService, ProviderPair, ReviewStore};

use crate::config::Config;

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// The moderation gate, constructed once at startup
    pub moderation: Arc<ModerationService>,
    /// Maximum accepted image size in bytes
    pub max_image_size: usize,
}

impl AppState {
    /// Build the moderation service from configuration.
    pub fn from_config(
        providers: ProviderPair,
        review_store: Arc<dyn ReviewStore>,
        config: &Config,
    ) -> vigil_core::Result<Self> {
        let moderation = ModerationService::builder(providers)
            .thresholds(config.thresholds.clone())
            .ttl(config.ttl)
            .review_store(review_store)
            .max_image_size(config.max_image_size)
            .build()?;

        Ok(Self {
            moderation: Arc::new(moderation),
            max_image_size: config.max_image_size,
        })
    }
}
