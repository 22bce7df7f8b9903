//! Pending-review records and their lifecycle.
//!
//! A record is created as `pending` when a scan lands in the review band
//! and is resolved exactly once by a moderator:
//!
//! ```text
//! pending --approve--> approved
//! pending --reject---> rejected
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::decision::{ModerationDecision, Verdict};
use crate::error::{ModerationError, Result};
use crate::fingerprint::ContentFingerprint;

/// Lifecycle state of a review record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ReviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl ReviewState {
    /// Final state for a moderator verdict. `PendingReview` is not final.
    pub fn resolved_from(verdict: Verdict) -> Result<Self> {
        match verdict {
            Verdict::Approved => Ok(Self::Approved),
            Verdict::Rejected => Ok(Self::Rejected),
            Verdict::PendingReview => Err(ModerationError::Validation(
                "A review must resolve to approved or rejected".into(),
            )),
        }
    }
}

impl std::str::FromStr for ReviewState {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(ModerationError::Serialization(format!(
                "Unknown review state '{other}'"
            ))),
        }
    }
}

/// Trimmed, non-empty moderator id.
pub fn validate_moderator_id(moderator_id: &str) -> Result<&str> {
    let moderator_id = moderator_id.trim();
    if moderator_id.is_empty() {
        return Err(ModerationError::Validation("moderator_id is required".into()));
    }
    Ok(moderator_id)
}

/// Queue priority for moderators, 4 being most urgent.
pub fn review_priority(overall: f64) -> u8 {
    if overall >= 0.80 {
        4
    } else if overall >= 0.70 {
        3
    } else if overall >= 0.60 {
        2
    } else {
        1
    }
}

/// A `pending_review` decision awaiting (or having received) a moderator verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReviewRecord {
    pub fingerprint: ContentFingerprint,
    pub uploader_id: String,
    /// Snapshot of the decision that opened the review
    pub decision: ModerationDecision,
    pub state: ReviewState,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

impl PendingReviewRecord {
    pub fn new(decision: ModerationDecision, uploader_id: impl Into<String>) -> Self {
        Self {
            fingerprint: decision.fingerprint.clone(),
            uploader_id: uploader_id.into(),
            priority: review_priority(decision.overall),
            decision,
            state: ReviewState::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == ReviewState::Pending
    }

    /// When the record last changed state.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.resolved_at.unwrap_or(self.created_at)
    }

    /// Verdict the record currently stands for.
    pub fn verdict(&self) -> Verdict {
        match self.state {
            ReviewState::Pending => Verdict::PendingReview,
            ReviewState::Approved => Verdict::Approved,
            ReviewState::Rejected => Verdict::Rejected,
        }
    }

    /// The record after a moderator verdict. `self` is left untouched.
    ///
    /// Only `Approved` and `Rejected` are valid verdicts, and only a
    /// pending record can be resolved.
    pub fn resolve(&self, verdict: Verdict, moderator_id: &str) -> Result<Self> {
        if !self.is_pending() {
            return Err(ModerationError::ReviewConflict {
                fingerprint: self.fingerprint.to_string(),
                state: self.state,
            });
        }

        let state = ReviewState::resolved_from(verdict)?;
        let moderator_id = validate_moderator_id(moderator_id)?;

        Ok(Self {
            state,
            resolved_at: Some(Utc::now()),
            resolved_by: Some(moderator_id.to_string()),
            ..self.clone()
        })
    }
}

/// Durable store for review records.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Insert a pending record. If a pending record already exists for the
    /// fingerprint it is kept and returned instead.
    async fn insert_pending(&self, record: PendingReviewRecord) -> Result<PendingReviewRecord>;

    async fn get(&self, fingerprint: &ContentFingerprint) -> Result<Option<PendingReviewRecord>>;

    /// Records for an uploader, newest first.
    async fn list_by_uploader(&self, uploader_id: &str) -> Result<Vec<PendingReviewRecord>>;

    /// Atomically move a pending record to its final state.
    ///
    /// Fails with `NotFound` if no record exists and `ReviewConflict` if the
    /// record was already resolved.
    async fn resolve(
        &self,
        fingerprint: &ContentFingerprint,
        verdict: Verdict,
        moderator_id: &str,
    ) -> Result<PendingReviewRecord>;

    /// Number of records still pending.
    async fn pending_count(&self) -> Result<usize>;
}

/// In-memory review store (development and tests).
#[derive(Default)]
pub struct MemoryReviewStore {
    records: DashMap<String, PendingReviewRecord>,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    async fn insert_pending(&self, record: PendingReviewRecord) -> Result<PendingReviewRecord> {
        match self.records.entry(record.fingerprint.to_string()) {
            Entry::Occupied(existing) if existing.get().is_pending() => Ok(existing.get().clone()),
            Entry::Occupied(mut resolved) => {
                resolved.insert(record.clone());
                Ok(record)
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn get(&self, fingerprint: &ContentFingerprint) -> Result<Option<PendingReviewRecord>> {
        Ok(self
            .records
            .get(fingerprint.as_str())
            .map(|entry| entry.value().clone()))
    }

    async fn list_by_uploader(&self, uploader_id: &str) -> Result<Vec<PendingReviewRecord>> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|entry| entry.uploader_id == uploader_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn resolve(
        &self,
        fingerprint: &ContentFingerprint,
        verdict: Verdict,
        moderator_id: &str,
    ) -> Result<PendingReviewRecord> {
        let mut entry = self
            .records
            .get_mut(fingerprint.as_str())
            .ok_or_else(|| ModerationError::NotFound(format!("No review for {fingerprint}")))?;

        let resolved = entry.resolve(verdict, moderator_id)?;
        *entry = resolved.clone();
        Ok(resolved)
    }

    async fn pending_count(&self) -> Result<usize> {
        Ok(self.records.iter().filter(|entry| entry.is_pending()).count())
    }
}
