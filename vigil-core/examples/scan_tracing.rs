//! Example demonstrating moderation audit tracing with scripted providers.
//!
//! Run with: cargo run -p vigil-core --example scan_tracing

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, Rgb, RgbImage};
use tracing_subscriber::{fmt, EnvFilter};
use vigil_core::{MockOutcome, MockProvider, ModerationService, ProviderPair};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::new("vigil_core=debug,audit=info,info"))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    println!("=== Moderation Tracing Demo ===\n");

    // Primary fails twice, then a flaky fallback is never needed
    let providers = ProviderPair {
        primary: Arc::new(MockProvider::with_script(
            "primary",
            [
                MockOutcome::Transient,
                MockOutcome::Transient,
                MockOutcome::scores([("nsfw", 0.62), ("violence", 0.04)]),
            ],
        )),
        fallback: Arc::new(MockProvider::new("fallback")),
    };

    let service = match ModerationService::builder(providers).build() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to build service: {}", e);
            return;
        }
    };

    let mut png = Cursor::new(Vec::new());
    let img = RgbImage::from_pixel(8, 8, Rgb([200, 120, 40]));
    if let Err(e) = img.write_to(&mut png, ImageFormat::Png) {
        eprintln!("Failed to encode demo image: {}", e);
        return;
    }
    let png = png.into_inner();

    for round in 1..=2 {
        println!("\nScan #{round}...\n");
        match service.scan(png.clone(), "demo-user").await {
            Ok(outcome) => {
                println!("   Verdict:  {}", outcome.verdict());
                println!("   Cached:   {}", outcome.cached);
                println!("   Message:  {}", outcome.message);
                println!("   Took:     {:?}", outcome.scan_duration);
            }
            Err(e) => println!("   Failed: {}", e),
        }
    }
}
