//! Moderent scan API (primary classifier).
//!
//! Moderent reports per-category scores on a 0-100 scale:
//!
//! ```json
//! { "scores": { "nsfw": 91.5, "violence": 3.0, "hate_speech": 0.4 } }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::http_client::{encode_image, ProviderHttpClient, ProviderHttpConfig};
use super::{clamp_score, ModerationProvider, ProviderId, RawScan, DEFAULT_CATEGORIES};
use crate::error::{ModerationError, Result};

/// Default Moderent API endpoint.
const DEFAULT_API_URL: &str = "https://api.moderent.com/v1/scan";

const PROVIDER_NAME: &str = "moderent";

/// Configuration for the Moderent client.
#[derive(Clone)]
pub struct ModerentConfig {
    /// Scan endpoint URL
    pub api_url: String,
    /// API key sent as a bearer token
    pub api_key: String,
    /// Client-side request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for ModerentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModerentConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ModerentConfig {
    /// Create configuration from environment variables.
    ///
    /// Required: `MODERENT_API_KEY`
    /// Optional: `MODERENT_API_URL`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("MODERENT_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ModerationError::Configuration(
                    "MODERENT_API_KEY environment variable not set".into(),
                )
            })?;

        let api_url =
            std::env::var("MODERENT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        Ok(Self {
            api_url,
            api_key,
            timeout: Duration::from_secs(5),
        })
    }
}

#[derive(Debug, Serialize)]
struct ScanRequest<'a> {
    image: String,
    categories: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct ScanResponse {
    #[serde(default)]
    scores: Option<HashMap<String, f64>>,
}

/// Moderent classifier client.
pub struct ModerentProvider {
    http: ProviderHttpClient,
    config: ModerentConfig,
}

impl ModerentProvider {
    #[instrument(level = "debug", skip_all, fields(api_url = %config.api_url))]
    pub fn new(config: ModerentConfig) -> Result<Self> {
        debug!("Creating Moderent client");
        let http = ProviderHttpClient::new(ProviderHttpConfig {
            timeout: config.timeout,
            allow_http: config.api_url.starts_with("http://"),
        })?;
        info!("Moderent client created");
        Ok(Self { http, config })
    }

    /// Convert a Moderent response (0-100 scale) into the common shape.
    fn parse_response(resp: ScanResponse) -> Result<RawScan> {
        let scores = resp.scores.ok_or_else(|| {
            ModerationError::fatal(PROVIDER_NAME, "response is missing `scores`")
        })?;

        let scores: BTreeMap<String, f64> = scores
            .into_iter()
            .map(|(label, score)| (label, clamp_score(score / 100.0)))
            .collect();

        Ok(RawScan::new(ProviderId::Moderent, scores))
    }
}

#[async_trait]
impl ModerationProvider for ModerentProvider {
    #[instrument(level = "info", skip_all, fields(provider = PROVIDER_NAME, bytes = image.len()))]
    async fn scan(&self, image: &[u8]) -> Result<RawScan> {
        let request = ScanRequest {
            image: encode_image(image),
            categories: DEFAULT_CATEGORIES,
        };
        let authorization = format!("Bearer {}", self.config.api_key);

        let response: ScanResponse = self
            .http
            .post_json(&self.config.api_url, &authorization, PROVIDER_NAME, &request)
            .await?;

        Self::parse_response(response)
    }

    fn provider_id(&self) -> ProviderId {
        ProviderId::Moderent
    }
}
