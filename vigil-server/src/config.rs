//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;
use std::time::Duration;

use vigil_core::{CategoryThreshold, DecisionTtl, Thresholds, DEFAULT_MAX_IMAGE_SIZE};

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in MB (default: 4)
    pub body_limit_mb: usize,
    /// Maximum image size per upload in bytes (default: 2 MB)
    pub max_image_size: usize,
    /// Request timeout in seconds (default: 45, above the worst-case scan)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// Allow mock moderation providers (default: false, enable with ALLOW_MOCK_PROVIDERS=true)
    pub allow_mock_providers: bool,
    /// PostgreSQL URL for review records (in-memory when unset)
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 10)
    pub database_max_connections: u32,
    /// Score thresholds applied at startup
    pub thresholds: Thresholds,
    /// Cache lifetimes for decisions
    pub ttl: DecisionTtl,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_mb: 4,
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            timeout_secs: 45,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            // Enabled by default for tests; from_env() defaults to false
            allow_mock_providers: true,
            database_url: None,
            database_max_connections: 10,
            thresholds: Thresholds::default(),
            ttl: DecisionTtl::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Fails only on malformed moderation thresholds; other malformed values
    /// fall back to their defaults.
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let port = env_parse("PORT").unwrap_or(defaults.port);

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or(defaults.host);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let body_limit_mb = env_parse("BODY_LIMIT_MB").unwrap_or(defaults.body_limit_mb);

        let max_image_size = env_parse::<usize>("MAX_IMAGE_SIZE_MB")
            .map(|mb| mb * 1024 * 1024)
            .unwrap_or(defaults.max_image_size);

        let timeout_secs = env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs);

        let rate_limit_per_sec =
            env_parse("RATE_LIMIT_PER_SEC").unwrap_or(defaults.rate_limit_per_sec);

        let rate_limit_burst = env_parse("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst);

        // Enabled unless RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let allow_mock_providers = std::env::var("ALLOW_MOCK_PROVIDERS")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty());

        let database_max_connections =
            env_parse("DATABASE_MAX_CONNECTIONS").unwrap_or(defaults.database_max_connections);

        let thresholds = thresholds_from_env(
            env_parse("MODERATION_THRESHOLD_LOW"),
            env_parse("MODERATION_THRESHOLD_HIGH"),
            std::env::var("MODERATION_THRESHOLDS").ok().as_deref(),
        )?;

        let ttl = DecisionTtl {
            decided: env_parse("MODERATION_DECISION_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ttl.decided),
            pending: env_parse("MODERATION_PENDING_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ttl.pending),
        };

        Ok(Self {
            port,
            host,
            allowed_origins,
            body_limit_mb,
            max_image_size,
            timeout_secs,
            rate_limit_enabled,
            rate_limit_per_sec,
            rate_limit_burst,
            allow_mock_providers,
            database_url,
            database_max_connections,
            thresholds,
            ttl,
        })
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

/// Build thresholds from the default band plus `label=low:high` overrides.
fn thresholds_from_env(
    low: Option<f64>,
    high: Option<f64>,
    overrides: Option<&str>,
) -> Result<Thresholds, String> {
    let fallback = CategoryThreshold::default();
    let default = CategoryThreshold::new(low.unwrap_or(fallback.low), high.unwrap_or(fallback.high))
        .map_err(|e| e.to_string())?;

    let thresholds = Thresholds {
        default,
        ..Thresholds::default()
    };

    match overrides {
        Some(overrides) => thresholds.parse_overrides(overrides).map_err(|e| e.to_string()),
        None => Ok(thresholds),
    }
}
