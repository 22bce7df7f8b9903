//! End-to-end moderation flow with real encoded images and scripted providers.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use vigil_core::{
    fingerprint, CategoryThreshold, MockOutcome, MockProvider, ModerationError, ModerationService,
    ProviderId, ProviderPair, ReviewState, Thresholds, Verdict,
};

/// Encode a small solid-color image.
fn encode(color: [u8; 3], format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(16, 16, Rgb(color));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, format).unwrap();
    buffer.into_inner()
}

fn pair(primary: &Arc<MockProvider>, fallback: &Arc<MockProvider>) -> ProviderPair {
    ProviderPair {
        primary: primary.clone(),
        fallback: fallback.clone(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_fallback_decision_records_provider() {
    let primary = Arc::new(MockProvider::with_script(
        "primary",
        vec![MockOutcome::Transient; 3],
    ));
    let fallback = Arc::new(MockProvider::with_script(
        "fallback",
        [MockOutcome::scores([("nsfw", 0.95)])],
    ));
    let service = ModerationService::builder(pair(&primary, &fallback))
        .build()
        .unwrap();

    let outcome = service
        .scan(encode([10, 20, 30], ImageFormat::Png), "user-1")
        .await
        .unwrap();

    assert_eq!(outcome.verdict(), Verdict::Rejected);
    assert_eq!(
        outcome.decision.provider,
        ProviderId::Mock {
            name: "fallback".into()
        }
    );
    assert_eq!(primary.calls(), 3);
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_same_pixels_different_encoding_scanned_separately() {
    let primary = Arc::new(MockProvider::new("primary"));
    let fallback = Arc::new(MockProvider::new("fallback"));
    let service = ModerationService::builder(pair(&primary, &fallback))
        .build()
        .unwrap();

    let png = encode([1, 2, 3], ImageFormat::Png);
    let jpeg = encode([1, 2, 3], ImageFormat::Jpeg);
    assert_ne!(fingerprint(&png), fingerprint(&jpeg));

    service.scan(png.clone(), "user-1").await.unwrap();
    service.scan(jpeg, "user-1").await.unwrap();
    let again = service.scan(png, "user-2").await.unwrap();

    assert!(again.cached);
    assert_eq!(primary.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_primary_times_out_to_fallback() {
    let primary = Arc::new(MockProvider::new("primary").with_delay(Duration::from_secs(30)));
    let fallback = Arc::new(MockProvider::with_script(
        "fallback",
        [MockOutcome::scores([("nsfw", 0.05)])],
    ));
    let service = ModerationService::builder(pair(&primary, &fallback))
        .build()
        .unwrap();

    let outcome = service
        .scan(encode([0, 0, 0], ImageFormat::Png), "user-1")
        .await
        .unwrap();

    assert_eq!(outcome.verdict(), Verdict::Approved);
    assert_eq!(primary.calls(), 3);
    // Bounded by three 5s deadlines plus backoff, never the 30s call
    assert!(outcome.scan_duration < Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_review_lifecycle() {
    let primary = Arc::new(MockProvider::with_script(
        "primary",
        [MockOutcome::scores([("violence", 0.72)])],
    ));
    let fallback = Arc::new(MockProvider::new("fallback"));
    let thresholds = Thresholds::default().with_category(
        "violence",
        CategoryThreshold::new(0.6, 0.9).unwrap(),
    );
    let service = ModerationService::builder(pair(&primary, &fallback))
        .thresholds(thresholds)
        .build()
        .unwrap();

    let image = encode([120, 0, 0], ImageFormat::Png);
    let fp = fingerprint(&image);

    let outcome = service.scan(image, "user-7").await.unwrap();
    assert_eq!(outcome.verdict(), Verdict::PendingReview);
    assert!(!outcome.message.contains("violence"));

    let records = service.status_by_uploader("user-7").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].priority, 3);
    assert_eq!(records[0].state, ReviewState::Pending);

    service
        .resolve_review(&fp, Verdict::Approved, "moderator-1")
        .await
        .unwrap();
    let status = service.status_by_fingerprint(&fp).await.unwrap();
    assert_eq!(status.verdict, Verdict::Approved);

    let err = service
        .resolve_review(&fp, Verdict::PendingReview, "moderator-2")
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::ReviewConflict { .. }));
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let service = ModerationService::builder(ProviderPair::mock())
        .max_image_size(32)
        .build()
        .unwrap();

    let err = service
        .scan(encode([9, 9, 9], ImageFormat::Png), "user-1")
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::Validation(_)));
}
