//! The moderation gate: fingerprint, cache, coalesced scan, decision, review.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::cache::{KeyValueStore, MemoryKvStore, ModerationCache};
use crate::decision::{
    user_message, DecisionMapper, DecisionTtl, ModerationDecision, Thresholds, Verdict,
};
use crate::error::{ModerationError, Result};
use crate::fingerprint::ContentFingerprint;
use crate::provider::ProviderPair;
use crate::retry::{RetryController, RetryPolicy};
use crate::status::{MemoryReviewStore, PendingReviewRecord, ReviewStore};
use crate::upload::{ImageUpload, ModerationRequest, DEFAULT_MAX_IMAGE_SIZE};

/// Result of moderating one upload.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub decision: ModerationDecision,
    /// Generic explanation for the uploader
    pub message: &'static str,
    /// Served from the cache without a provider call
    pub cached: bool,
    pub scan_duration: Duration,
}

impl ScanOutcome {
    pub fn verdict(&self) -> Verdict {
        self.decision.verdict
    }
}

/// Current moderation state of a fingerprint.
#[derive(Debug, Clone)]
pub struct StatusView {
    pub fingerprint: ContentFingerprint,
    /// Effective verdict from the newer of the review record and the cached decision
    pub verdict: Verdict,
    /// Cached decision, absent once it expired
    pub decision: Option<ModerationDecision>,
    pub review: Option<PendingReviewRecord>,
}

/// Thresholds, TTLs and retry parameters currently in force.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    pub thresholds: Thresholds,
    pub ttl: DecisionTtl,
    pub retry: RetryPolicy,
    pub max_image_size: usize,
}

/// Builder for [`ModerationService`].
pub struct ModerationServiceBuilder {
    providers: ProviderPair,
    retry: RetryPolicy,
    thresholds: Thresholds,
    ttl: DecisionTtl,
    kv_store: Option<Arc<dyn KeyValueStore>>,
    review_store: Option<Arc<dyn ReviewStore>>,
    max_image_size: usize,
}

impl ModerationServiceBuilder {
    pub fn new(providers: ProviderPair) -> Self {
        Self {
            providers,
            retry: RetryPolicy::default(),
            thresholds: Thresholds::default(),
            ttl: DecisionTtl::default(),
            kv_store: None,
            review_store: None,
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
        }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn ttl(mut self, ttl: DecisionTtl) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn kv_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.kv_store = Some(store);
        self
    }

    pub fn review_store(mut self, store: Arc<dyn ReviewStore>) -> Self {
        self.review_store = Some(store);
        self
    }

    pub fn max_image_size(mut self, bytes: usize) -> Self {
        self.max_image_size = bytes;
        self
    }

    pub fn build(self) -> Result<ModerationService> {
        if self.retry.max_attempts == 0 {
            return Err(ModerationError::Configuration(
                "retry policy needs at least one attempt".into(),
            ));
        }

        let kv_store = self
            .kv_store
            .unwrap_or_else(|| Arc::new(MemoryKvStore::new()));
        let review_store = self
            .review_store
            .unwrap_or_else(|| Arc::new(MemoryReviewStore::new()));

        Ok(ModerationService {
            pipeline: ScanPipeline {
                providers: self.providers,
                retry: RetryController::new(self.retry),
                mapper: Arc::new(DecisionMapper::new(self.thresholds, self.ttl)?),
                cache: ModerationCache::new(kv_store),
                reviews: review_store,
            },
            max_image_size: self.max_image_size,
        })
    }
}

/// Everything a scan task needs, cheap to clone into it.
#[derive(Clone)]
struct ScanPipeline {
    providers: ProviderPair,
    retry: RetryController,
    mapper: Arc<DecisionMapper>,
    cache: ModerationCache,
    reviews: Arc<dyn ReviewStore>,
}

impl ScanPipeline {
    /// Provider scan through storage. Runs once per coalesced fingerprint.
    async fn run(self, image: Vec<u8>, request: ModerationRequest) -> Result<ModerationDecision> {
        let report = self
            .retry
            .scan_with_fallback(
                self.providers.primary.as_ref(),
                self.providers.fallback.as_ref(),
                &image,
            )
            .await
            .map_err(|exhausted| {
                warn!(
                    target: "audit",
                    fingerprint = %request.fingerprint,
                    attempts = exhausted.attempts.len(),
                    error = %exhausted.last_error,
                    "All providers exhausted"
                );
                ModerationError::from(exhausted)
            })?;

        let decision = self
            .mapper
            .map(&report.scan, &request.fingerprint, request.submitted_at);

        info!(
            target: "audit",
            fingerprint = %decision.fingerprint,
            uploader_id = %request.uploader_id,
            verdict = %decision.verdict,
            provider = %decision.provider,
            overall = decision.overall,
            flagged = ?decision.flagged_categories,
            attempts = report.attempts.len(),
            used_fallback = report.used_fallback,
            "Moderation decision"
        );

        if let Err(e) = self.cache.store(&decision).await {
            warn!(
                fingerprint = %decision.fingerprint,
                error = %e,
                "Cache write failed, decision not cached"
            );
        }

        if decision.verdict == Verdict::PendingReview {
            let record = PendingReviewRecord::new(decision.clone(), &request.uploader_id);
            if let Err(e) = self.reviews.insert_pending(record).await {
                warn!(
                    fingerprint = %decision.fingerprint,
                    error = %e,
                    "Failed to record pending review"
                );
            }
        }

        Ok(decision)
    }
}

/// Moderation gate shared by all request handlers.
pub struct ModerationService {
    pipeline: ScanPipeline,
    max_image_size: usize,
}

impl ModerationService {
    pub fn builder(providers: ProviderPair) -> ModerationServiceBuilder {
        ModerationServiceBuilder::new(providers)
    }

    /// Moderate an upload.
    ///
    /// Identical bytes are scanned at most once while a decision for them is
    /// cached or a scan for them is in flight.
    #[instrument(level = "info", skip_all, fields(uploader_id = %uploader_id, bytes = image.len()))]
    pub async fn scan(&self, image: Vec<u8>, uploader_id: &str) -> Result<ScanOutcome> {
        let start = Instant::now();
        let upload = ImageUpload::new(image, self.max_image_size)?;
        let request = ModerationRequest::new(&upload, uploader_id)?;
        let fingerprint = request.fingerprint.clone();

        if let Some(decision) = self.pipeline.cache.lookup(&fingerprint).await {
            info!(
                target: "audit",
                fingerprint = %fingerprint,
                uploader_id = %request.uploader_id,
                verdict = %decision.verdict,
                "Cache hit"
            );
            return Ok(ScanOutcome {
                message: user_message(&decision),
                decision,
                cached: true,
                scan_duration: start.elapsed(),
            });
        }

        let pipeline = self.pipeline.clone();
        let image = upload.into_bytes();
        let decision = self
            .pipeline
            .cache
            .coalesce(&fingerprint, move || pipeline.run(image, request))
            .await?;

        Ok(ScanOutcome {
            message: user_message(&decision),
            decision,
            cached: false,
            scan_duration: start.elapsed(),
        })
    }

    /// Apply a moderator's final verdict to a pending review.
    ///
    /// The resolved decision replaces the cached one so later uploads of the
    /// same bytes get the moderator's verdict.
    #[instrument(level = "info", skip_all, fields(fingerprint = %fingerprint, verdict = %verdict))]
    pub async fn resolve_review(
        &self,
        fingerprint: &ContentFingerprint,
        verdict: Verdict,
        moderator_id: &str,
    ) -> Result<PendingReviewRecord> {
        let record = self
            .pipeline
            .reviews
            .resolve(fingerprint, verdict, moderator_id)
            .await?;

        info!(
            target: "audit",
            fingerprint = %fingerprint,
            moderator_id = %moderator_id,
            state = %record.state,
            "Review resolved"
        );

        let ttl = self.pipeline.mapper.ttl().for_verdict(verdict);
        let resolved = record.decision.resolved_by_moderator(verdict, ttl);
        if let Err(e) = self.pipeline.cache.store(&resolved).await {
            warn!(fingerprint = %fingerprint, error = %e, "Cache write failed for resolved review");
        }

        Ok(record)
    }

    /// Current state of `fingerprint`, from its review record or cached decision.
    ///
    /// The newer of the two wins: a pending review whose cache entry expired
    /// is still pending, and a rescan after the entry expired overrides an
    /// older review. An unreachable review store degrades to the cache.
    pub async fn status_by_fingerprint(
        &self,
        fingerprint: &ContentFingerprint,
    ) -> Result<StatusView> {
        let (review, store_error) = match self.pipeline.reviews.get(fingerprint).await {
            Ok(review) => (review, None),
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "Review store lookup failed");
                (None, Some(e))
            }
        };
        let decision = self.pipeline.cache.lookup(fingerprint).await;

        let verdict = match (&review, &decision) {
            (Some(record), Some(decision)) if decision.created_at >= record.updated_at() => {
                decision.verdict
            }
            (Some(record), _) => record.verdict(),
            (None, Some(decision)) => decision.verdict,
            (None, None) => {
                return Err(store_error.unwrap_or_else(|| {
                    ModerationError::NotFound(format!("No moderation status for {fingerprint}"))
                }))
            }
        };

        Ok(StatusView {
            fingerprint: fingerprint.clone(),
            verdict,
            decision,
            review,
        })
    }

    /// Review records for an uploader, newest first.
    pub async fn status_by_uploader(&self, uploader_id: &str) -> Result<Vec<PendingReviewRecord>> {
        self.pipeline.reviews.list_by_uploader(uploader_id.trim()).await
    }

    pub async fn pending_review_count(&self) -> Result<usize> {
        self.pipeline.reviews.pending_count().await
    }

    pub fn thresholds(&self) -> Thresholds {
        self.pipeline.mapper.thresholds()
    }

    /// Replace thresholds for future scans. Cached decisions are unaffected.
    pub fn update_thresholds(&self, thresholds: Thresholds) -> Result<()> {
        self.pipeline.mapper.update_thresholds(thresholds)?;
        info!(target: "audit", "Moderation thresholds updated");
        Ok(())
    }

    pub fn policy(&self) -> PolicySnapshot {
        PolicySnapshot {
            thresholds: self.thresholds(),
            ttl: self.pipeline.mapper.ttl(),
            retry: *self.pipeline.retry.policy(),
            max_image_size: self.max_image_size,
        }
    }

    /// Ids of the configured primary and fallback providers.
    pub fn provider_ids(&self) -> (String, String) {
        (
            self.pipeline.providers.primary.provider_id().to_string(),
            self.pipeline.providers.fallback.provider_id().to_string(),
        )
    }

    /// Number of scans currently in flight.
    pub fn in_flight_scans(&self) -> usize {
        self.pipeline.cache.in_flight_count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::provider::{MockOutcome, MockProvider, ModerationProvider};
    use crate::status::ReviewState;
    use crate::upload::fixtures::png_with;

    fn service(
        primary: MockProvider,
        fallback: MockProvider,
    ) -> (ModerationService, Arc<MockProvider>, Arc<MockProvider>) {
        let primary = Arc::new(primary);
        let fallback = Arc::new(fallback);
        let providers = ProviderPair {
            primary: primary.clone(),
            fallback: fallback.clone(),
        };
        let service = ModerationService::builder(providers).build().unwrap();
        (service, primary, fallback)
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_scan_served_from_cache() {
        let (service, primary, _) = service(
            MockProvider::with_script("primary", [MockOutcome::scores([("nsfw", 0.1)])]),
            MockProvider::new("fallback"),
        );
        let image = png_with(b"cat");

        let first = service.scan(image.clone(), "user-1").await.unwrap();
        let second = service.scan(image, "user-2").await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.decision, second.decision);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_uploads_one_provider_sequence() {
        let primary = MockProvider::with_script("primary", [MockOutcome::scores([("nsfw", 0.9)])])
            .with_delay(Duration::from_millis(500));
        let (service, primary, fallback) = service(primary, MockProvider::new("fallback"));
        let service = Arc::new(service);
        let image = png_with(b"same");

        let mut handles = Vec::new();
        for i in 0..10 {
            let service = Arc::clone(&service);
            let image = image.clone();
            handles.push(tokio::spawn(async move {
                service.scan(image, &format!("user-{i}")).await
            }));
        }

        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert_eq!(outcome.verdict(), Verdict::Rejected);
        }
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
        assert_eq!(service.in_flight_scans(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_review_recorded() {
        let (service, _, _) = service(
            MockProvider::with_script("primary", [MockOutcome::scores([("nsfw", 0.6)])]),
            MockProvider::new("fallback"),
        );
        let image = png_with(b"borderline");
        let fp = fingerprint(&image);

        let outcome = service.scan(image, "user-1").await.unwrap();
        assert_eq!(outcome.verdict(), Verdict::PendingReview);

        let status = service.status_by_fingerprint(&fp).await.unwrap();
        assert_eq!(status.verdict, Verdict::PendingReview);
        assert_eq!(status.review.unwrap().uploader_id, "user-1");
        assert_eq!(service.status_by_uploader("user-1").await.unwrap().len(), 1);
        assert_eq!(service.pending_review_count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_review_updates_cache() {
        let (service, primary, _) = service(
            MockProvider::with_script("primary", [MockOutcome::scores([("nsfw", 0.6)])]),
            MockProvider::new("fallback"),
        );
        let image = png_with(b"borderline");
        let fp = fingerprint(&image);

        service.scan(image.clone(), "user-1").await.unwrap();
        let record = service
            .resolve_review(&fp, Verdict::Rejected, "mod-1")
            .await
            .unwrap();
        assert_eq!(record.state, ReviewState::Rejected);

        let again = service.scan(image, "user-1").await.unwrap();
        assert!(again.cached);
        assert_eq!(again.verdict(), Verdict::Rejected);
        assert_eq!(primary.calls(), 1);

        let conflict = service
            .resolve_review(&fp, Verdict::Approved, "mod-2")
            .await
            .unwrap_err();
        assert!(matches!(conflict, ModerationError::ReviewConflict { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescan_after_resolution_overrides_review() {
        let (service, primary, _) = service(
            MockProvider::with_script(
                "primary",
                [
                    MockOutcome::scores([("nsfw", 0.6)]),
                    MockOutcome::scores([("nsfw", 0.95)]),
                ],
            ),
            MockProvider::new("fallback"),
        );
        let image = png_with(b"borderline");
        let fp = fingerprint(&image);

        service.scan(image.clone(), "user-1").await.unwrap();
        service
            .resolve_review(&fp, Verdict::Approved, "mod-1")
            .await
            .unwrap();
        assert_eq!(
            service.status_by_fingerprint(&fp).await.unwrap().verdict,
            Verdict::Approved
        );

        // The moderator's decision expires; the next upload is scanned again
        tokio::time::advance(Duration::from_secs(25 * 60 * 60)).await;
        let rescan = service.scan(image, "user-2").await.unwrap();
        assert!(!rescan.cached);
        assert_eq!(rescan.verdict(), Verdict::Rejected);
        assert_eq!(primary.calls(), 2);

        let status = service.status_by_fingerprint(&fp).await.unwrap();
        assert_eq!(status.verdict, Verdict::Rejected);
        assert_eq!(status.review.unwrap().state, ReviewState::Approved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescan_after_pending_expiry_overrides_review() {
        let (service, _, _) = service(
            MockProvider::with_script(
                "primary",
                [
                    MockOutcome::scores([("nsfw", 0.6)]),
                    MockOutcome::scores([("nsfw", 0.1)]),
                ],
            ),
            MockProvider::new("fallback"),
        );
        let image = png_with(b"borderline");
        let fp = fingerprint(&image);

        service.scan(image.clone(), "user-1").await.unwrap();
        tokio::time::advance(Duration::from_secs(2 * 60 * 60)).await;

        // Expired pending entry: the review alone still reports pending
        assert_eq!(
            service.status_by_fingerprint(&fp).await.unwrap().verdict,
            Verdict::PendingReview
        );

        let rescan = service.scan(image, "user-1").await.unwrap();
        assert_eq!(rescan.verdict(), Verdict::Approved);
        assert_eq!(
            service.status_by_fingerprint(&fp).await.unwrap().verdict,
            Verdict::Approved
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_not_cached() {
        let (service, primary, fallback) = service(
            MockProvider::with_script("primary", vec![MockOutcome::Transient; 3]),
            MockProvider::with_script("fallback", vec![MockOutcome::Transient; 3]),
        );
        let image = png_with(b"unlucky");
        let fp = fingerprint(&image);

        let err = service.scan(image.clone(), "user-1").await.unwrap_err();
        assert_eq!(err, ModerationError::ScanUnavailable { attempts: 6 });
        assert!(matches!(
            service.status_by_fingerprint(&fp).await,
            Err(ModerationError::NotFound(_))
        ));

        // Scripts are drained; the next scan reaches the providers again
        let outcome = service.scan(image, "user-1").await.unwrap();
        assert!(!outcome.cached);
        assert_eq!(primary.calls(), 4);
        assert_eq!(fallback.calls(), 3);
    }

    #[tokio::test]
    async fn test_invalid_upload_never_reaches_provider() {
        let (service, primary, _) =
            service(MockProvider::new("primary"), MockProvider::new("fallback"));

        let err = service.scan(b"not an image".to_vec(), "user-1").await.unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));
        let err = service.scan(png_with(b"ok"), "   ").await.unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_update_thresholds_applies_to_new_scans() {
        let (service, _, _) = service(
            MockProvider::with_script(
                "primary",
                [
                    MockOutcome::scores([("nsfw", 0.4)]),
                    MockOutcome::scores([("nsfw", 0.4)]),
                ],
            ),
            MockProvider::new("fallback"),
        );

        let before = service.scan(png_with(b"one"), "user-1").await.unwrap();
        assert_eq!(before.verdict(), Verdict::Approved);

        let mut thresholds = service.thresholds();
        thresholds.default.low = 0.3;
        service.update_thresholds(thresholds).unwrap();

        let after = service.scan(png_with(b"two"), "user-1").await.unwrap();
        assert_eq!(after.verdict(), Verdict::PendingReview);
    }

    /// Review store that is always down.
    struct DownReviewStore(AtomicUsize);

    #[async_trait]
    impl ReviewStore for DownReviewStore {
        async fn insert_pending(
            &self,
            _record: PendingReviewRecord,
        ) -> Result<PendingReviewRecord> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(ModerationError::CacheDegraded("review store down".into()))
        }
        async fn get(&self, _fp: &ContentFingerprint) -> Result<Option<PendingReviewRecord>> {
            Err(ModerationError::CacheDegraded("review store down".into()))
        }
        async fn list_by_uploader(&self, _uploader_id: &str) -> Result<Vec<PendingReviewRecord>> {
            Ok(vec![])
        }
        async fn resolve(
            &self,
            fp: &ContentFingerprint,
            _verdict: Verdict,
            _moderator_id: &str,
        ) -> Result<PendingReviewRecord> {
            Err(ModerationError::NotFound(fp.to_string()))
        }
        async fn pending_count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_review_store_failure_does_not_fail_scan() {
        let store = Arc::new(DownReviewStore(AtomicUsize::new(0)));
        let primary: Arc<dyn ModerationProvider> = Arc::new(MockProvider::with_script(
            "primary",
            [MockOutcome::scores([("nsfw", 0.6)])],
        ));
        let service = ModerationService::builder(ProviderPair {
            primary,
            fallback: Arc::new(MockProvider::new("fallback")),
        })
        .review_store(store.clone())
        .build()
        .unwrap();

        let outcome = service.scan(png_with(b"x"), "user-1").await.unwrap();
        assert_eq!(outcome.verdict(), Verdict::PendingReview);
        assert_eq!(store.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_degrades_to_cache_when_review_store_down() {
        let primary: Arc<dyn ModerationProvider> = Arc::new(MockProvider::with_script(
            "primary",
            [MockOutcome::scores([("nsfw", 0.1)])],
        ));
        let service = ModerationService::builder(ProviderPair {
            primary,
            fallback: Arc::new(MockProvider::new("fallback")),
        })
        .review_store(Arc::new(DownReviewStore(AtomicUsize::new(0))))
        .build()
        .unwrap();
        let image = png_with(b"clean");
        let fp = fingerprint(&image);

        service.scan(image, "user-1").await.unwrap();
        let status = service.status_by_fingerprint(&fp).await.unwrap();
        assert_eq!(status.verdict, Verdict::Approved);
        assert!(status.review.is_none());

        // Nothing cached either: the store failure is reported
        let err = service
            .status_by_fingerprint(&fingerprint(b"unknown"))
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::CacheDegraded(_)));
    }
}
