//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Posting engine configuration.
    #[serde(default)]
    pub posting: PostingConfig,
    /// Webhook delivery configuration.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Posting engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PostingConfig {
    /// Maximum attempts to commit the atomic unit under storage conflicts
    /// before surfacing `Unavailable` to the caller.
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: default_max_commit_attempts(),
        }
    }
}

fn default_max_commit_attempts() -> u32 {
    3
}

/// Webhook delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Number of delivery workers to run.
    #[serde(default = "default_worker_count")]
    pub worker_count: u32,
    /// Maximum jobs leased per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Seconds a lease is held before an unfinished job becomes eligible again.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    /// Seconds a worker sleeps when no job is eligible.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Per-request delivery timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum delivery attempts before a job is terminally failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff base delay in seconds.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// Backoff multiplier applied per attempt.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            batch_size: default_batch_size(),
            lease_secs: default_lease_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

fn default_worker_count() -> u32 {
    2
}

fn default_batch_size() -> u64 {
    10
}

fn default_lease_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    8
}

fn default_backoff_base_secs() -> u64 {
    1
}

fn default_backoff_factor() -> u32 {
    2
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("LEDAAS").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_defaults() {
        let cfg = WebhookConfig::default();
        assert_eq!(cfg.max_attempts, 8);
        assert_eq!(cfg.backoff_base_secs, 1);
        assert_eq!(cfg.backoff_factor, 2);
        assert!(cfg.lease_secs > cfg.poll_interval_secs);
    }

    #[test]
    fn test_posting_defaults() {
        assert_eq!(PostingConfig::default().max_commit_attempts, 3);
    }
}
