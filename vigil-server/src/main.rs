//! Vigil Server - REST API for the image moderation gate
//!
//! Exposes vigil-core via HTTP endpoints:
//! - POST /moderation/scan - Moderate an uploaded image
//! - GET /status/{fingerprint} - Moderation status of an image
//! - POST /reviews/{fingerprint}/resolve - Moderator resolution

use std::net::SocketAddr;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use vigil_core::ProviderFactory;
use vigil_server::{create_router_with_config, review_store_from_config, AppState, Config};

const DEFAULT_LOG_FILTER: &str = "vigil_server=info,vigil_core=info,tower_http=info";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let config = Config::from_env()?;

    if config.allow_mock_providers {
        tracing::warn!(
            "ALLOW_MOCK_PROVIDERS=true: missing providers are replaced by mocks that approve everything"
        );
    }

    let providers =
        ProviderFactory::pair_from_env(config.allow_mock_providers).map_err(|e| e.to_string())?;
    let review_store = review_store_from_config(&config)
        .await
        .map_err(|e| e.to_string())?;
    let state = AppState::from_config(providers, review_store, &config).map_err(|e| e.to_string())?;

    let app = create_router_with_config(state, &config);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind {addr}: {e}"))?;

    tracing::info!(%addr, version = env!("CARGO_PKG_VERSION"), "Vigil moderation API listening");

    // Peer addresses are required by the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| format!("Server error: {e}"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
