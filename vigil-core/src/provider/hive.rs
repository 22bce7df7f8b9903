//! Hive moderation API (fallback classifier).
//!
//! Hive nests scores inside a task envelope, already on a 0.0-1.0 scale:
//!
//! ```json
//! { "status": [ { "response": { "output": [
//!     { "classes": { "nsfw": { "score": 0.12 }, "violence": { "score": 0.01 } } }
//! ] } } ] }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::http_client::{encode_image, ProviderHttpClient, ProviderHttpConfig};
use super::{clamp_score, ModerationProvider, ProviderId, RawScan, DEFAULT_CATEGORIES};
use crate::error::{ModerationError, Result};

/// Default Hive synchronous task endpoint.
const DEFAULT_API_URL: &str = "https://api.thehive.ai/api/v2/task/sync";

const PROVIDER_NAME: &str = "hive";

/// Configuration for the Hive client.
#[derive(Clone)]
pub struct HiveConfig {
    /// Task endpoint URL
    pub api_url: String,
    /// API key sent with the `Token` scheme
    pub api_key: String,
    /// Client-side request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for HiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiveConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HiveConfig {
    /// Create configuration from environment variables.
    ///
    /// Required: `HIVE_API_KEY`
    /// Optional: `HIVE_API_URL`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("HIVE_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ModerationError::Configuration("HIVE_API_KEY environment variable not set".into())
            })?;

        let api_url = std::env::var("HIVE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        Ok(Self {
            api_url,
            api_key,
            timeout: Duration::from_secs(5),
        })
    }
}

#[derive(Debug, Serialize)]
struct TaskRequest<'a> {
    image: String,
    models: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    #[serde(default)]
    status: Vec<TaskStatus>,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    response: TaskOutput,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    #[serde(default)]
    output: Vec<ClassOutput>,
}

#[derive(Debug, Deserialize)]
struct ClassOutput {
    #[serde(default)]
    classes: HashMap<String, ClassScore>,
}

#[derive(Debug, Deserialize)]
struct ClassScore {
    score: f64,
}

/// Hive classifier client.
pub struct HiveProvider {
    http: ProviderHttpClient,
    config: HiveConfig,
}

impl HiveProvider {
    #[instrument(level = "debug", skip_all, fields(api_url = %config.api_url))]
    pub fn new(config: HiveConfig) -> Result<Self> {
        debug!("Creating Hive client");
        let http = ProviderHttpClient::new(ProviderHttpConfig {
            timeout: config.timeout,
            allow_http: config.api_url.starts_with("http://"),
        })?;
        info!("Hive client created");
        Ok(Self { http, config })
    }

    /// Unwrap the task envelope into the common shape.
    fn parse_response(resp: TaskResponse) -> Result<RawScan> {
        let output = resp
            .status
            .into_iter()
            .next()
            .and_then(|status| status.response.output.into_iter().next())
            .ok_or_else(|| {
                ModerationError::fatal(PROVIDER_NAME, "response has no classification output")
            })?;

        let scores: BTreeMap<String, f64> = output
            .classes
            .into_iter()
            .map(|(label, class)| (label, clamp_score(class.score)))
            .collect();

        Ok(RawScan::new(ProviderId::Hive, scores))
    }
}

#[async_trait]
impl ModerationProvider for HiveProvider {
    #[instrument(level = "info", skip_all, fields(provider = PROVIDER_NAME, bytes = image.len()))]
    async fn scan(&self, image: &[u8]) -> Result<RawScan> {
        let request = TaskRequest {
            image: encode_image(image),
            models: DEFAULT_CATEGORIES,
        };
        let authorization = format!("Token {}", self.config.api_key);

        let response: TaskResponse = self
            .http
            .post_json(&self.config.api_url, &authorization, PROVIDER_NAME, &request)
            .await?;

        Self::parse_response(response)
    }

    fn provider_id(&self) -> ProviderId {
        ProviderId::Hive
    }
}
