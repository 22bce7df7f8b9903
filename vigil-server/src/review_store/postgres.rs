//! PostgreSQL implementation of the review store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use vigil_core::{
    validate_moderator_id, ContentFingerprint, ModerationDecision, ModerationError,
    PendingReviewRecord, ReviewState, ReviewStore, Verdict,
};

use super::ReviewStoreError;

const COLUMNS: &str =
    "fingerprint, uploader_id, decision, state, priority, created_at, resolved_at, resolved_by";

/// PostgreSQL-backed review store.
///
/// Resolution is a single conditional `UPDATE ... WHERE state = 'pending'`,
/// so concurrent moderators cannot both resolve the same record.
#[derive(Clone)]
pub struct PostgresReviewStore {
    pool: PgPool,
}

/// Row type for database queries.
#[derive(FromRow)]
struct ReviewRow {
    fingerprint: String,
    uploader_id: String,
    decision: Json<ModerationDecision>,
    state: String,
    priority: i16,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
}

impl TryFrom<ReviewRow> for PendingReviewRecord {
    type Error = ReviewStoreError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let fingerprint = ContentFingerprint::from_hex(&row.fingerprint)
            .map_err(|e| ReviewStoreError::Corrupt(e.to_string()))?;
        let state: ReviewState = row
            .state
            .parse()
            .map_err(|e: ModerationError| ReviewStoreError::Corrupt(e.to_string()))?;
        let priority = u8::try_from(row.priority)
            .map_err(|e| ReviewStoreError::Corrupt(format!("priority {}: {e}", row.priority)))?;

        Ok(Self {
            fingerprint,
            uploader_id: row.uploader_id,
            decision: row.decision.0,
            state,
            priority,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
        })
    }
}

impl PostgresReviewStore {
    /// Connect and run migrations.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, ReviewStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| ReviewStoreError::Connection(e.to_string()))?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Review store connected and migrations applied");

        Ok(Self { pool })
    }

    /// Create a review store from an existing pool (for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(
        &self,
        fingerprint: &ContentFingerprint,
    ) -> Result<Option<PendingReviewRecord>, ReviewStoreError> {
        let row: Option<ReviewRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM pending_reviews WHERE fingerprint = $1"
        ))
        .bind(fingerprint.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PendingReviewRecord::try_from).transpose()
    }
}

#[async_trait]
impl ReviewStore for PostgresReviewStore {
    async fn insert_pending(
        &self,
        record: PendingReviewRecord,
    ) -> vigil_core::Result<PendingReviewRecord> {
        // A resolved row is replaced by the new review; a pending row is kept
        let inserted: Option<ReviewRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO pending_reviews
                (fingerprint, uploader_id, decision, state, priority, created_at)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            ON CONFLICT (fingerprint) DO UPDATE SET
                uploader_id = EXCLUDED.uploader_id,
                decision = EXCLUDED.decision,
                state = 'pending',
                priority = EXCLUDED.priority,
                created_at = EXCLUDED.created_at,
                resolved_at = NULL,
                resolved_by = NULL
            WHERE pending_reviews.state <> 'pending'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(record.fingerprint.as_str())
        .bind(&record.uploader_id)
        .bind(Json(record.decision.clone()))
        .bind(i16::from(record.priority))
        .bind(record.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(ReviewStoreError::from)?;

        match inserted {
            Some(row) => {
                tracing::debug!(fingerprint = %record.fingerprint, "Stored pending review");
                Ok(PendingReviewRecord::try_from(row)?)
            }
            None => self.fetch(&record.fingerprint).await?.ok_or_else(|| {
                ModerationError::CacheDegraded(format!(
                    "Review for {} vanished during insert",
                    record.fingerprint
                ))
            }),
        }
    }

    async fn get(
        &self,
        fingerprint: &ContentFingerprint,
    ) -> vigil_core::Result<Option<PendingReviewRecord>> {
        Ok(self.fetch(fingerprint).await?)
    }

    async fn list_by_uploader(
        &self,
        uploader_id: &str,
    ) -> vigil_core::Result<Vec<PendingReviewRecord>> {
        let rows: Vec<ReviewRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM pending_reviews WHERE uploader_id = $1 ORDER BY created_at DESC"
        ))
        .bind(uploader_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ReviewStoreError::from)?;

        rows.into_iter()
            .map(|row| PendingReviewRecord::try_from(row).map_err(ModerationError::from))
            .collect()
    }

    async fn resolve(
        &self,
        fingerprint: &ContentFingerprint,
        verdict: Verdict,
        moderator_id: &str,
    ) -> vigil_core::Result<PendingReviewRecord> {
        let valid = ReviewState::resolved_from(verdict)
            .and_then(|state| Ok((state, validate_moderator_id(moderator_id)?)));
        let (state, moderator_id) = match valid {
            Ok(valid) => valid,
            // Missing and already-resolved records are reported before bad input
            Err(_) => {
                return match self.fetch(fingerprint).await? {
                    Some(existing) => existing.resolve(verdict, moderator_id),
                    None => Err(ModerationError::NotFound(format!("No review for {fingerprint}"))),
                }
            }
        };

        let updated: Option<ReviewRow> = sqlx::query_as(&format!(
            r#"
            UPDATE pending_reviews
            SET state = $2, resolved_at = NOW(), resolved_by = $3
            WHERE fingerprint = $1 AND state = 'pending'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(fingerprint.as_str())
        .bind(state.to_string())
        .bind(moderator_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ReviewStoreError::from)?;

        if let Some(row) = updated {
            return Ok(PendingReviewRecord::try_from(row)?);
        }

        // Nothing updated: either no such review or it was already resolved
        match self.fetch(fingerprint).await? {
            Some(existing) => Err(ModerationError::ReviewConflict {
                fingerprint: fingerprint.to_string(),
                state: existing.state,
            }),
            None => Err(ModerationError::NotFound(format!("No review for {fingerprint}"))),
        }
    }

    async fn pending_count(&self) -> vigil_core::Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pending_reviews WHERE state = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(ReviewStoreError::from)?;

        Ok(usize::try_from(count).unwrap_or(0))
    }
}
