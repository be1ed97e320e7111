//! Application configuration, shared by the `api` and `worker` binaries.

use std::env;

/// Configuration loaded once at process start via [`Config::from_env`].
/// Each binary only reads the fields it needs, but both read from the same
/// struct so there is one source of truth for env var names and defaults.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis
    pub redis_url: String,

    // Queue
    pub queue_name: String,
    pub queue_max_length: u64,
    pub queue_batch_size: u32,
    pub queue_poll_timeout_secs: u64,
    pub max_retry_count: u32,

    // Rate limiting
    pub rate_limit_requests_per_minute: u32,
    pub rate_limit_burst: u32,

    // Ingest
    pub max_batch_size: usize,
    pub batch_timeout_secs: u64,

    // Aggregation
    pub aggregation_interval_secs: u64,
    pub aggregation_replay_window_secs: u64,

    // Retention (external hints only; the core never prunes rows itself)
    pub event_retention_days: u32,
    pub aggregate_retention_days: u32,

    // Query cache
    pub cache_ttl_aggregates_secs: u64,
    pub cache_ttl_breakdowns_secs: u64,

    // API server
    pub api_port: u16,
    pub api_key_hmac_secret: String,

    // Logging
    pub log_level: String,
    pub log_format: String,
    pub environment: String,
}

impl Config {
    /// Load configuration from the process environment. `.env` is read
    /// first via `dotenvy` (a no-op if the file doesn't exist), then
    /// `std::env` is consulted so real environment variables always win.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: parse_env_or("DATABASE_MAX_CONNECTIONS", 10)?,

            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            queue_name: env::var("QUEUE_NAME").unwrap_or_else(|_| "usage_events".to_string()),
            queue_max_length: parse_env_or("QUEUE_MAX_LENGTH", 100_000)?,
            queue_batch_size: parse_env_or("QUEUE_BATCH_SIZE", 100)?,
            queue_poll_timeout_secs: parse_env_or("QUEUE_POLL_TIMEOUT_SECS", 5)?,
            max_retry_count: parse_env_or("MAX_RETRY_COUNT", 3)?,

            rate_limit_requests_per_minute: parse_env_or("RATE_LIMIT_RPM", 1000)?,
            rate_limit_burst: parse_env_or("RATE_LIMIT_BURST", 100)?,

            max_batch_size: parse_env_or("MAX_BATCH_SIZE", 1000)?,
            batch_timeout_secs: parse_env_or("BATCH_TIMEOUT_SECONDS", 30)?,

            aggregation_interval_secs: parse_env_or("AGGREGATION_INTERVAL_SECS", 300)?,
            aggregation_replay_window_secs: parse_env_or("AGGREGATION_REPLAY_WINDOW_SECS", 900)?,

            event_retention_days: parse_env_or("EVENT_RETENTION_DAYS", 365)?,
            aggregate_retention_days: parse_env_or("AGGREGATE_RETENTION_DAYS", 1095)?,

            cache_ttl_aggregates_secs: parse_env_or("CACHE_TTL_AGGREGATES_SECS", 300)?,
            cache_ttl_breakdowns_secs: parse_env_or("CACHE_TTL_BREAKDOWNS_SECS", 600)?,

            api_port: parse_env_or("API_PORT", 8080)?,
            api_key_hmac_secret: {
                let secret = env::var("API_KEY_HMAC_SECRET")
                    .map_err(|_| ConfigError::Missing("API_KEY_HMAC_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "API_KEY_HMAC_SECRET must be at least 32 bytes",
                    ));
                }
                secret
            },

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: {
                let format = env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
                if format != "json" && format != "pretty" && format != "console" {
                    return Err(ConfigError::Invalid(
                        "LOG_FORMAT",
                        "must be \"json\", \"pretty\", or \"console\"",
                    ));
                }
                format
            },
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        })
    }
}

/// Parse an env var into `T`, falling back to `default` when unset.
/// Returns `ConfigError::Invalid` when the var is set but not parseable,
/// rather than silently falling back — an unparseable value is almost
/// always a typo worth failing loudly on.
fn parse_env_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(key, "failed to parse")),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
    #[error("weak secret: {0}")]
    WeakSecret(&'static str),
}
