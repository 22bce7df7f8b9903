//! Decision mapping: normalized provider scores to a verdict.
//!
//! Each category is judged against its own `[low, high)` band:
//!
//! | score               | verdict          |
//! |---------------------|------------------|
//! | `score >= high`     | `rejected`       |
//! | `low <= score < high` | `pending_review` |
//! | `score < low`       | `approved`       |
//!
//! The most severe per-category verdict wins.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModerationError, Result};
use crate::fingerprint::ContentFingerprint;
use crate::provider::{ProviderId, RawScan};

/// Default low threshold (manual review from 50% confidence)
pub const DEFAULT_LOW_THRESHOLD: f64 = 0.50;

/// Default high threshold (auto-reject from 85% confidence)
pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.85;

/// Default TTL for approved/rejected decisions (24 hours)
pub const DEFAULT_DECISION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default TTL for pending_review decisions (1 hour)
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(60 * 60);

/// Final categorical moderation outcome.
///
/// Ordered by severity: `Approved < PendingReview < Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    PendingReview,
    Rejected,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::PendingReview => write!(f, "pending_review"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for Verdict {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approved" => Ok(Self::Approved),
            "pending_review" => Ok(Self::PendingReview),
            "rejected" => Ok(Self::Rejected),
            other => Err(ModerationError::Validation(format!(
                "Unknown verdict '{other}'"
            ))),
        }
    }
}

/// Review band for one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryThreshold {
    pub low: f64,
    pub high: f64,
}

impl CategoryThreshold {
    pub fn new(low: f64, high: f64) -> Result<Self> {
        let threshold = Self { low, high };
        threshold.validate()?;
        Ok(threshold)
    }

    fn validate(&self) -> Result<()> {
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !in_range(self.low) || !in_range(self.high) || self.low > self.high {
            return Err(ModerationError::Validation(format!(
                "Invalid threshold band: require 0 <= low ({}) <= high ({}) <= 1",
                self.low, self.high
            )));
        }
        Ok(())
    }

    fn classify(&self, score: f64) -> Verdict {
        if score >= self.high {
            Verdict::Rejected
        } else if score >= self.low {
            Verdict::PendingReview
        } else {
            Verdict::Approved
        }
    }
}

impl Default for CategoryThreshold {
    fn default() -> Self {
        Self {
            low: DEFAULT_LOW_THRESHOLD,
            high: DEFAULT_HIGH_THRESHOLD,
        }
    }
}

/// Per-category thresholds with a default band for unlisted categories.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Thresholds {
    pub default: CategoryThreshold,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryThreshold>,
}

impl Thresholds {
    /// Set the band for a single category.
    pub fn with_category(mut self, label: impl Into<String>, band: CategoryThreshold) -> Self {
        self.categories.insert(label.into(), band);
        self
    }

    /// Band that applies to `label`.
    pub fn for_category(&self, label: &str) -> CategoryThreshold {
        self.categories.get(label).copied().unwrap_or(self.default)
    }

    pub fn validate(&self) -> Result<()> {
        self.default.validate()?;
        for (label, band) in &self.categories {
            band.validate().map_err(|e| {
                ModerationError::Validation(format!("Category '{label}': {e}"))
            })?;
        }
        Ok(())
    }

    /// Parse per-category overrides of the form `nsfw=0.3:0.85,violence=0.4:0.9`.
    pub fn parse_overrides(mut self, overrides: &str) -> Result<Self> {
        for entry in overrides.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (label, band) = entry.split_once('=').ok_or_else(|| {
                ModerationError::Validation(format!("Invalid threshold entry '{entry}'"))
            })?;
            let (low, high) = band.split_once(':').ok_or_else(|| {
                ModerationError::Validation(format!("Invalid threshold band '{band}'"))
            })?;
            let parse = |v: &str| {
                v.trim().parse::<f64>().map_err(|e| {
                    ModerationError::Validation(format!("Invalid threshold '{v}': {e}"))
                })
            };
            let band = CategoryThreshold::new(parse(low)?, parse(high)?)?;
            self.categories.insert(label.trim().to_string(), band);
        }
        Ok(self)
    }
}

/// How long each kind of decision stays cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTtl {
    /// Approved and rejected decisions
    pub decided: Duration,
    /// Pending-review decisions, shorter so a stale review does not linger
    pub pending: Duration,
}

impl DecisionTtl {
    pub fn for_verdict(&self, verdict: Verdict) -> Duration {
        match verdict {
            Verdict::PendingReview => self.pending,
            Verdict::Approved | Verdict::Rejected => self.decided,
        }
    }
}

impl Default for DecisionTtl {
    fn default() -> Self {
        Self {
            decided: DEFAULT_DECISION_TTL,
            pending: DEFAULT_PENDING_TTL,
        }
    }
}

/// Immutable outcome of a scan (or of a moderator resolution).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationDecision {
    pub fingerprint: ContentFingerprint,
    pub verdict: Verdict,
    /// Normalized per-category confidence scores
    pub scores: BTreeMap<String, f64>,
    /// Highest category score
    pub overall: f64,
    /// Categories at or above their low threshold (audit only)
    pub flagged_categories: Vec<String>,
    /// Provider that produced the scores
    pub provider: ProviderId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ModerationDecision {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// A moderator's final verdict over an earlier pending decision.
    pub fn resolved_by_moderator(&self, verdict: Verdict, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            verdict,
            provider: ProviderId::ManualReview,
            created_at: now,
            expires_at: expiry_after(now, ttl),
            ..self.clone()
        }
    }
}

/// `start + ttl`, saturating at the maximum representable time.
pub fn expiry_after(start: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| start.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Maps provider scans to decisions under runtime-adjustable thresholds.
pub struct DecisionMapper {
    thresholds: RwLock<Thresholds>,
    ttl: DecisionTtl,
}

impl DecisionMapper {
    pub fn new(thresholds: Thresholds, ttl: DecisionTtl) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            thresholds: RwLock::new(thresholds),
            ttl,
        })
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Replace all thresholds. Invalid sets are rejected and leave the
    /// current thresholds in place.
    pub fn update_thresholds(&self, thresholds: Thresholds) -> Result<()> {
        thresholds.validate()?;
        *self
            .thresholds
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = thresholds;
        Ok(())
    }

    pub fn ttl(&self) -> DecisionTtl {
        self.ttl
    }

    /// Map a scan of `fingerprint`, submitted at `submitted_at`, to a decision.
    pub fn map(
        &self,
        scan: &RawScan,
        fingerprint: &ContentFingerprint,
        submitted_at: DateTime<Utc>,
    ) -> ModerationDecision {
        let thresholds = self.thresholds();

        let mut verdict = Verdict::Approved;
        let mut flagged_categories = Vec::new();
        for (label, score) in &scan.scores {
            let category_verdict = thresholds.for_category(label).classify(*score);
            if category_verdict > Verdict::Approved {
                flagged_categories.push(label.clone());
            }
            verdict = verdict.max(category_verdict);
        }

        ModerationDecision {
            fingerprint: fingerprint.clone(),
            verdict,
            scores: scan.scores.clone(),
            overall: scan.max_score(),
            flagged_categories,
            provider: scan.provider.clone(),
            created_at: Utc::now(),
            expires_at: expiry_after(submitted_at, self.ttl.for_verdict(verdict)),
        }
    }
}

/// Generic, deterministic explanation for the uploader.
///
/// Depends only on the verdict, never on category labels or scores.
pub fn user_message(decision: &ModerationDecision) -> &'static str {
    match decision.verdict {
        Verdict::Approved => "Image approved for upload.",
        Verdict::PendingReview => {
            "Your image is being reviewed by our team. You'll be notified when it has been reviewed."
        }
        Verdict::Rejected => {
            "This image doesn't meet our community guidelines. Please upload a different photo."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;

    fn scan(pairs: &[(&str, f64)]) -> RawScan {
        RawScan::new(
            ProviderId::Moderent,
            pairs.iter().map(|(l, s)| (l.to_string(), *s)).collect(),
        )
    }

    fn mapper(thresholds: Thresholds) -> DecisionMapper {
        DecisionMapper::new(thresholds, DecisionTtl::default()).unwrap()
    }

    fn band(low: f64, high: f64) -> CategoryThreshold {
        CategoryThreshold::new(low, high).unwrap()
    }

    #[test]
    fn test_example_mapping() {
        let thresholds = Thresholds::default().with_category("nudity", band(0.3, 0.85));
        let mapper = mapper(thresholds);
        let fp = fingerprint(b"img");
        let now = Utc::now();

        assert_eq!(
            mapper.map(&scan(&[("nudity", 0.92)]), &fp, now).verdict,
            Verdict::Rejected
        );
        assert_eq!(
            mapper.map(&scan(&[("nudity", 0.5)]), &fp, now).verdict,
            Verdict::PendingReview
        );
        assert_eq!(
            mapper.map(&scan(&[("nudity", 0.1)]), &fp, now).verdict,
            Verdict::Approved
        );
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let mapper = mapper(Thresholds::default().with_category("nsfw", band(0.3, 0.85)));
        let fp = fingerprint(b"img");
        let now = Utc::now();

        assert_eq!(
            mapper.map(&scan(&[("nsfw", 0.85)]), &fp, now).verdict,
            Verdict::Rejected
        );
        assert_eq!(
            mapper.map(&scan(&[("nsfw", 0.3)]), &fp, now).verdict,
            Verdict::PendingReview
        );
    }

    #[test]
    fn test_most_severe_category_wins() {
        let mapper = mapper(Thresholds::default());
        let decision = mapper.map(
            &scan(&[("nsfw", 0.1), ("violence", 0.6), ("hate_speech", 0.9)]),
            &fingerprint(b"img"),
            Utc::now(),
        );

        assert_eq!(decision.verdict, Verdict::Rejected);
        assert_eq!(decision.overall, 0.9);
        assert_eq!(decision.flagged_categories, vec!["hate_speech", "violence"]);
    }

    #[test]
    fn test_independent_category_thresholds() {
        let thresholds = Thresholds::default()
            .with_category("nsfw", band(0.2, 0.4))
            .with_category("violence", band(0.7, 0.95));
        let mapper = mapper(thresholds);
        let fp = fingerprint(b"img");

        // 0.5 rejects nsfw but is below the violence review band
        let nsfw = mapper.map(&scan(&[("nsfw", 0.5)]), &fp, Utc::now());
        let violence = mapper.map(&scan(&[("violence", 0.5)]), &fp, Utc::now());
        assert_eq!(nsfw.verdict, Verdict::Rejected);
        assert_eq!(violence.verdict, Verdict::Approved);
    }

    #[test]
    fn test_empty_scores_approved() {
        let decision =
            mapper(Thresholds::default()).map(&scan(&[]), &fingerprint(b"x"), Utc::now());
        assert_eq!(decision.verdict, Verdict::Approved);
        assert!(decision.flagged_categories.is_empty());
    }

    #[test]
    fn test_expiry_uses_verdict_ttl() {
        let mapper = mapper(Thresholds::default());
        let fp = fingerprint(b"img");
        let submitted = Utc::now();

        let approved = mapper.map(&scan(&[("nsfw", 0.1)]), &fp, submitted);
        let pending = mapper.map(&scan(&[("nsfw", 0.6)]), &fp, submitted);

        assert_eq!(approved.expires_at - submitted, chrono::Duration::hours(24));
        assert_eq!(pending.expires_at - submitted, chrono::Duration::hours(1));
    }

    #[test]
    fn test_provider_retained() {
        let mut raw = scan(&[("nsfw", 0.1)]);
        raw.provider = ProviderId::Hive;
        let decision = mapper(Thresholds::default()).map(&raw, &fingerprint(b"img"), Utc::now());
        assert_eq!(decision.provider, ProviderId::Hive);
    }

    #[test]
    fn test_user_message_hides_labels_and_scores() {
        let mapper = mapper(Thresholds::default());
        let fp = fingerprint(b"img");
        for pairs in [
            [("nsfw", 0.99), ("violence", 0.0)],
            [("nsfw", 0.0), ("violence", 0.99)],
            [("nsfw", 0.6), ("violence", 0.1)],
            [("nsfw", 0.0), ("violence", 0.0)],
        ] {
            let decision = mapper.map(&scan(&pairs), &fp, Utc::now());
            let message = user_message(&decision);
            assert!(!message.contains("nsfw"));
            assert!(!message.contains("violence"));
            assert!(!message.contains('%'));
            assert!(!message.chars().any(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_user_message_deterministic_per_verdict() {
        let mapper = mapper(Thresholds::default());
        let fp = fingerprint(b"img");
        let a = mapper.map(&scan(&[("nsfw", 0.99)]), &fp, Utc::now());
        let b = mapper.map(&scan(&[("violence", 0.95)]), &fp, Utc::now());
        assert_eq!(user_message(&a), user_message(&b));
    }

    #[test]
    fn test_update_thresholds_validates() {
        let mapper = mapper(Thresholds::default());
        let bad = Thresholds {
            default: CategoryThreshold {
                low: 0.9,
                high: 0.1,
            },
            categories: BTreeMap::new(),
        };

        assert!(mapper.update_thresholds(bad).is_err());
        assert_eq!(mapper.thresholds(), Thresholds::default());

        let good = Thresholds::default().with_category("nsfw", band(0.2, 0.6));
        mapper.update_thresholds(good.clone()).unwrap();
        assert_eq!(mapper.thresholds(), good);
    }

    #[test]
    fn test_parse_overrides() {
        let thresholds = Thresholds::default()
            .parse_overrides("nsfw=0.3:0.85, violence = 0.4:0.9")
            .unwrap();
        assert_eq!(thresholds.for_category("nsfw"), band(0.3, 0.85));
        assert_eq!(thresholds.for_category("violence"), band(0.4, 0.9));
        assert_eq!(thresholds.for_category("other"), CategoryThreshold::default());

        assert!(Thresholds::default().parse_overrides("nsfw").is_err());
        assert!(Thresholds::default().parse_overrides("nsfw=0.9:0.1").is_err());
    }

    #[test]
    fn test_verdict_order_and_parse() {
        assert!(Verdict::Rejected > Verdict::PendingReview);
        assert!(Verdict::PendingReview > Verdict::Approved);
        assert_eq!("pending_review".parse::<Verdict>().unwrap(), Verdict::PendingReview);
        assert!("maybe".parse::<Verdict>().is_err());
    }
}
