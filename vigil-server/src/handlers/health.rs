//! Health check handlers
//!
//! Provides health and readiness endpoints for monitoring and orchestration.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status: "healthy" or "degraded"
    #[schema(example = "healthy")]
    pub status: String,
    /// Server version from Cargo.toml
    #[schema(example = "0.1.0")]
    pub version: String,
    /// Service name
    #[schema(example = "vigil-server")]
    pub service: String,
    /// Primary moderation provider
    #[schema(example = "moderent")]
    pub primary_provider: String,
    /// Fallback moderation provider
    #[schema(example = "hive")]
    pub fallback_provider: String,
    /// Whether either provider is a mock (no real content check)
    #[schema(example = false)]
    pub mock_providers: bool,
    /// Scans currently in flight
    #[schema(example = 0)]
    pub in_flight_scans: usize,
}

/// GET /health - Health check endpoint
///
/// Reports the configured providers. A deployment running on mock providers
/// is reported as "degraded".
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (primary_provider, fallback_provider) = state.moderation.provider_ids();
    let mock_providers =
        primary_provider.starts_with("mock:") || fallback_provider.starts_with("mock:");

    let status = if mock_providers { "degraded" } else { "healthy" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "vigil-server".to_string(),
        primary_provider,
        fallback_provider,
        mock_providers,
        in_flight_scans: state.moderation.in_flight_scans(),
    })
}

/// Readiness response for Kubernetes
#[derive(Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Whether the service is ready to accept traffic
    pub ready: bool,
    /// Optional message explaining status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// GET /ready - Kubernetes readiness probe
///
/// Returns 200 once the review store answers, 503 otherwise.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready to accept traffic", body = ReadyResponse),
        (status = 503, description = "Review store unreachable", body = ReadyResponse)
    )
)]
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    match state.moderation.pending_review_count().await {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                message: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    ready: false,
                    message: Some("Review store unavailable".to_string()),
                }),
            )
        }
    }
}
