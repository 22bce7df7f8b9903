//! Moderation policy handlers
//!
//! Handles GET /moderation/config and PUT /moderation/thresholds.

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use vigil_core::{CategoryThreshold, PolicySnapshot, Thresholds};

use crate::error::ApiError;
use crate::state::AppState;

/// Review band for one category
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ThresholdBand {
    /// Scores at or above this go to review
    #[schema(example = 0.5)]
    pub low: f64,
    /// Scores at or above this are rejected
    #[schema(example = 0.85)]
    pub high: f64,
}

impl From<CategoryThreshold> for ThresholdBand {
    fn from(band: CategoryThreshold) -> Self {
        Self {
            low: band.low,
            high: band.high,
        }
    }
}

/// Thresholds: a default band plus per-category overrides
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ThresholdsBody {
    pub default: ThresholdBand,
    #[serde(default)]
    pub categories: BTreeMap<String, ThresholdBand>,
}

impl From<Thresholds> for ThresholdsBody {
    fn from(thresholds: Thresholds) -> Self {
        Self {
            default: thresholds.default.into(),
            categories: thresholds
                .categories
                .into_iter()
                .map(|(label, band)| (label, band.into()))
                .collect(),
        }
    }
}

impl TryFrom<ThresholdsBody> for Thresholds {
    type Error = ApiError;

    fn try_from(body: ThresholdsBody) -> Result<Self, Self::Error> {
        let mut thresholds = Thresholds {
            default: CategoryThreshold::new(body.default.low, body.default.high)?,
            ..Thresholds::default()
        };
        for (label, band) in body.categories {
            let label = label.trim().to_lowercase();
            if label.is_empty() {
                return Err(ApiError::bad_request("Category label must not be empty"));
            }
            thresholds =
                thresholds.with_category(label, CategoryThreshold::new(band.low, band.high)?);
        }
        Ok(thresholds)
    }
}

/// Moderation policy currently in force
#[derive(Serialize, ToSchema)]
pub struct ModerationConfigResponse {
    pub thresholds: ThresholdsBody,
    /// Cache lifetime of approved/rejected decisions
    #[schema(example = 86400)]
    pub decision_ttl_secs: u64,
    /// Cache lifetime of pending_review decisions
    #[schema(example = 3600)]
    pub pending_ttl_secs: u64,
    /// Attempts per provider
    #[schema(example = 3)]
    pub max_attempts: usize,
    /// Deadline per provider attempt
    #[schema(example = 5000)]
    pub attempt_timeout_ms: u64,
    #[schema(example = 2097152)]
    pub max_image_size: usize,
    #[schema(example = "moderent")]
    pub primary_provider: String,
    #[schema(example = "hive")]
    pub fallback_provider: String,
}

fn config_response(state: &AppState, policy: PolicySnapshot) -> ModerationConfigResponse {
    let (primary_provider, fallback_provider) = state.moderation.provider_ids();
    ModerationConfigResponse {
        thresholds: policy.thresholds.into(),
        decision_ttl_secs: policy.ttl.decided.as_secs(),
        pending_ttl_secs: policy.ttl.pending.as_secs(),
        max_attempts: policy.retry.max_attempts,
        attempt_timeout_ms: u64::try_from(policy.retry.attempt_timeout.as_millis())
            .unwrap_or(u64::MAX),
        max_image_size: policy.max_image_size,
        primary_provider,
        fallback_provider,
    }
}

/// Get the moderation policy
#[utoipa::path(
    get,
    path = "/moderation/config",
    tag = "Policy",
    responses(
        (status = 200, description = "Current moderation policy", body = ModerationConfigResponse)
    )
)]
pub async fn get_config_handler(State(state): State<AppState>) -> Json<ModerationConfigResponse> {
    let policy = state.moderation.policy();
    Json(config_response(&state, policy))
}

/// Replace the moderation thresholds
///
/// Applies to scans started after the update. Decisions already cached keep
/// their verdict until they expire. Every band must satisfy
/// `0 <= low <= high <= 1`.
#[utoipa::path(
    put,
    path = "/moderation/thresholds",
    tag = "Policy",
    request_body = ThresholdsBody,
    responses(
        (status = 200, description = "Thresholds updated", body = ModerationConfigResponse),
        (status = 400, description = "Invalid threshold band")
    )
)]
pub async fn update_thresholds_handler(
    State(state): State<AppState>,
    Json(body): Json<ThresholdsBody>,
) -> Result<Json<ModerationConfigResponse>, ApiError> {
    let thresholds = Thresholds::try_from(body)?;
    state.moderation.update_thresholds(thresholds)?;

    let policy = state.moderation.policy();
    Ok(Json(config_response(&state, policy)))
}
