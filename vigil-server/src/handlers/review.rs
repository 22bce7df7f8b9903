//! Moderator review handler
//!
//! Handles POST /reviews/{fingerprint}/resolve requests.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use vigil_core::{ContentFingerprint, Verdict};

use crate::error::ApiError;
use crate::handlers::status::ReviewSummary;
use crate::state::AppState;

/// Moderator decision on a pending review
#[derive(Deserialize, ToSchema)]
pub struct ResolveReviewRequest {
    /// Final verdict: approved or rejected
    #[schema(example = "approved")]
    pub verdict: String,
    /// Id of the moderator taking the decision
    #[schema(example = "moderator-7")]
    pub moderator_id: String,
}

/// Resolve a pending review
///
/// Moves a `pending` review to `approved` or `rejected`. The moderator's
/// verdict also replaces the cached decision, so later uploads of the same
/// image receive it directly.
#[utoipa::path(
    post,
    path = "/reviews/{fingerprint}/resolve",
    tag = "Review",
    params(
        ("fingerprint" = String, Path, description = "SHA3-256 fingerprint (64 hex chars)")
    ),
    request_body = ResolveReviewRequest,
    responses(
        (status = 200, description = "Review resolved", body = ReviewSummary),
        (status = 400, description = "Invalid verdict, moderator id or fingerprint"),
        (status = 404, description = "No review for this image"),
        (status = 409, description = "Review already resolved")
    )
)]
pub async fn resolve_review_handler(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
    Json(request): Json<ResolveReviewRequest>,
) -> Result<Json<ReviewSummary>, ApiError> {
    let fingerprint = ContentFingerprint::from_hex(&fingerprint)?;
    let verdict: Verdict = request.verdict.parse()?;

    let record = state
        .moderation
        .resolve_review(&fingerprint, verdict, &request.moderator_id)
        .await?;

    Ok(Json(ReviewSummary::from(&record)))
}
