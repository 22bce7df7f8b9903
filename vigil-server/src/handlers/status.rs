//! Moderation status handlers
//!
//! Handles GET /status/{fingerprint} and GET /status/uploader/{uploader_id}.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use vigil_core::{ContentFingerprint, ModerationDecision, PendingReviewRecord, Verdict};

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::validate_uploader_id;

/// Decision metadata. Category scores are never exposed.
#[derive(Serialize, ToSchema)]
pub struct DecisionSummary {
    #[schema(example = "pending_review")]
    pub verdict: String,
    /// Provider that decided, or `manual_review`
    #[schema(example = "moderent")]
    pub provider: String,
    pub created_at: DateTime<Utc>,
    /// When the cached decision expires
    pub expires_at: DateTime<Utc>,
}

impl From<&ModerationDecision> for DecisionSummary {
    fn from(decision: &ModerationDecision) -> Self {
        Self {
            verdict: decision.verdict.to_string(),
            provider: decision.provider.to_string(),
            created_at: decision.created_at,
            expires_at: decision.expires_at,
        }
    }
}

/// A review record as shown to API clients.
#[derive(Serialize, ToSchema)]
pub struct ReviewSummary {
    #[schema(example = "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532")]
    pub fingerprint: String,
    /// Review state: pending, approved or rejected
    #[schema(example = "pending")]
    pub state: String,
    /// 1 (low) to 4 (urgent)
    #[schema(example = 3)]
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

impl From<&PendingReviewRecord> for ReviewSummary {
    fn from(record: &PendingReviewRecord) -> Self {
        Self {
            fingerprint: record.fingerprint.to_string(),
            state: record.state.to_string(),
            priority: record.priority,
            created_at: record.created_at,
            resolved_at: record.resolved_at,
            resolved_by: record.resolved_by.clone(),
        }
    }
}

/// Moderation status of one image
#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    pub fingerprint: String,
    /// `pending` while awaiting a moderator, `resolved` otherwise
    #[schema(example = "resolved")]
    pub state: String,
    /// Effective verdict
    #[schema(example = "approved")]
    pub verdict: String,
    /// Cached decision, absent once it expired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewSummary>,
}

/// Get the moderation status of an image by fingerprint
#[utoipa::path(
    get,
    path = "/status/{fingerprint}",
    tag = "Status",
    params(
        ("fingerprint" = String, Path, description = "SHA3-256 fingerprint (64 hex chars)")
    ),
    responses(
        (status = 200, description = "Moderation status", body = StatusResponse),
        (status = 400, description = "Malformed fingerprint"),
        (status = 404, description = "No decision or review for this image")
    )
)]
pub async fn status_handler(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let fingerprint = ContentFingerprint::from_hex(&fingerprint)?;
    let view = state.moderation.status_by_fingerprint(&fingerprint).await?;

    let review_state = if view.verdict == Verdict::PendingReview {
        "pending"
    } else {
        "resolved"
    };

    Ok(Json(StatusResponse {
        fingerprint: view.fingerprint.to_string(),
        state: review_state.to_string(),
        verdict: view.verdict.to_string(),
        decision: view.decision.as_ref().map(DecisionSummary::from),
        review: view.review.as_ref().map(ReviewSummary::from),
    }))
}

/// Review records of one uploader
#[derive(Serialize, ToSchema)]
pub struct UploaderStatusResponse {
    #[schema(example = "user-42")]
    pub uploader_id: String,
    /// Number of reviews still pending
    #[schema(example = 1)]
    pub pending_reviews: usize,
    /// Reviews, newest first
    pub reviews: Vec<ReviewSummary>,
}

/// List review records for an uploader
#[utoipa::path(
    get,
    path = "/status/uploader/{uploader_id}",
    tag = "Status",
    params(
        ("uploader_id" = String, Path, description = "Id of the uploading user")
    ),
    responses(
        (status = 200, description = "Review records, newest first", body = UploaderStatusResponse),
        (status = 400, description = "Invalid uploader id")
    )
)]
pub async fn uploader_status_handler(
    State(state): State<AppState>,
    Path(uploader_id): Path<String>,
) -> Result<Json<UploaderStatusResponse>, ApiError> {
    let uploader_id = validate_uploader_id(Some(&uploader_id))?;
    let records = state.moderation.status_by_uploader(&uploader_id).await?;

    Ok(Json(UploaderStatusResponse {
        pending_reviews: records.iter().filter(|r| r.is_pending()).count(),
        reviews: records.iter().map(ReviewSummary::from).collect(),
        uploader_id,
    }))
}
