//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use imageauth_core::fingerprint::DescriptorConfig;
use imageauth_core::{DetectionConfig, MatcherConfig};

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in MB (default: 50)
    pub body_limit_mb: usize,
    /// Maximum image size per upload in MB (default: 25)
    pub max_file_size_mb: usize,
    /// Request timeout in seconds (default: 120; ledger confirmation dominates)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// SQLite URL for the corpus; in-memory corpus when unset
    pub database_url: Option<String>,
    /// Ledger gateway base URL; in-memory ledger when unset
    pub ledger_url: Option<String>,
    /// Ledger request timeout in seconds (default: 60)
    pub ledger_timeout_secs: u64,
    /// ONNX morph classifier; classifier disabled when unset
    pub model_path: Option<String>,
    /// Perceptual-hash Hamming threshold, exclusive (default: 8)
    pub phash_threshold: u32,
    /// Descriptor cosine threshold, exclusive (default: 0.85)
    pub descriptor_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        let matcher = MatcherConfig::default();
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_mb: 50,
            max_file_size_mb: 25,
            timeout_secs: 120,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            database_url: None,
            ledger_url: None,
            ledger_timeout_secs: 60,
            model_path: None,
            phash_threshold: matcher.phash_threshold,
            descriptor_threshold: matcher.descriptor_threshold,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

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

        // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            port: env_or("PORT", defaults.port),
            host,
            allowed_origins,
            body_limit_mb: env_or("BODY_LIMIT_MB", defaults.body_limit_mb),
            max_file_size_mb: env_or("MAX_FILE_SIZE_MB", defaults.max_file_size_mb),
            timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.timeout_secs),
            rate_limit_enabled,
            rate_limit_per_sec: env_or("RATE_LIMIT_PER_SEC", defaults.rate_limit_per_sec),
            rate_limit_burst: env_or("RATE_LIMIT_BURST", defaults.rate_limit_burst),
            database_url: env_opt("DATABASE_URL"),
            ledger_url: env_opt("LEDGER_URL"),
            ledger_timeout_secs: env_or("LEDGER_TIMEOUT_SECS", defaults.ledger_timeout_secs),
            model_path: env_opt("MODEL_PATH"),
            phash_threshold: env_or("PHASH_THRESHOLD", defaults.phash_threshold),
            descriptor_threshold: env_or("DESCRIPTOR_THRESHOLD", defaults.descriptor_threshold),
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_timeout_secs)
    }

    pub fn detection_config(&self) -> DetectionConfig {
        DetectionConfig {
            matcher: MatcherConfig {
                phash_threshold: self.phash_threshold,
                descriptor_threshold: self.descriptor_threshold,
            },
            descriptor: DescriptorConfig::default(),
        }
    }
}
