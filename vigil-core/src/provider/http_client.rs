//! Shared JSON-over-HTTPS client for classifier providers.
//!
//! Performs exactly one request per call and classifies failures as
//! transient or fatal. Retries and backoff live in [`crate::retry`].

use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::error::{ModerationError, Result};

/// Configuration for a provider HTTP client.
#[derive(Debug, Clone)]
pub struct ProviderHttpConfig {
    /// Client-side request timeout. The retry controller enforces its own
    /// per-attempt deadline on top of this.
    pub timeout: Duration,
    /// Allow plain HTTP (local stubs only).
    pub allow_http: bool,
}

/// JSON client shared by the Moderent and Hive adapters.
pub struct ProviderHttpClient {
    client: Client,
}

impl ProviderHttpClient {
    pub fn new(config: ProviderHttpConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout);
        if !config.allow_http {
            builder = builder
                .https_only(true)
                .min_tls_version(reqwest::tls::Version::TLS_1_3);
        }

        let client = builder.build().map_err(|e| {
            ModerationError::Configuration(format!("Failed to create HTTP client: {e}"))
        })?;

        Ok(Self { client })
    }

    /// POST `body` as JSON and parse the JSON response.
    pub async fn post_json<B, R>(
        &self,
        url: &str,
        authorization: &str,
        provider_name: &str,
        body: &B,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, authorization)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let latency_ms = start.elapsed().as_millis() as u64;
                if is_transient_error(&e) {
                    warn!(error = %e, latency_ms, "Transient error, will retry");
                    ModerationError::transient(provider_name, format!("request failed: {e}"))
                } else {
                    warn!(error = %e, latency_ms, "Permanent error, aborting");
                    ModerationError::fatal(provider_name, format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        debug!(status = %status, "Received HTTP response");

        if !status.is_success() {
            let latency_ms = start.elapsed().as_millis() as u64;
            let message = format!("API returned status: {status}");
            return if is_transient_status(status) {
                warn!(status = %status, latency_ms, "Transient HTTP status, will retry");
                Err(ModerationError::transient(provider_name, message))
            } else {
                warn!(status = %status, latency_ms, "Permanent HTTP error");
                Err(ModerationError::fatal(provider_name, message))
            };
        }

        // A body cut off mid-read is a network failure, only malformed JSON is fatal
        let body = response.bytes().await.map_err(|e| {
            warn!(error = %e, "Failed to read response body, will retry");
            ModerationError::transient(provider_name, format!("failed to read response: {e}"))
        })?;
        let parsed: R = parse_response(provider_name, &body)?;

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed successfully"
        );

        Ok(parsed)
    }
}

/// Base64-encode image bytes for a JSON request body.
pub fn encode_image(image: &[u8]) -> String {
    BASE64.encode(image)
}

/// Decode a fully read success body. Malformed JSON fails the same way on retry.
pub fn parse_response<R: DeserializeOwned>(provider_name: &str, body: &[u8]) -> Result<R> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "Failed to parse JSON response");
        ModerationError::fatal(provider_name, format!("failed to parse response: {e}"))
    })
}

/// Check if a reqwest error is transient and should be retried.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Check if an HTTP status code indicates a transient error.
///
/// Every 5xx is retryable, as are 408 and 429. Other 4xx codes mean the
/// request itself was rejected.
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT
        )
}
