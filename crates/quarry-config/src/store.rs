use std::time::Duration;

use serde::Deserialize;

use crate::duration;

/// Relational store configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite URL (`sqlite://path.db`) or plain file path
    #[serde(default = "default_url")]
    pub url: String,
    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long to wait for a pooled connection
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: String,
    /// Idle connections are closed after this long
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: String,
    /// Upper bound on a single query execution
    #[serde(default = "default_query_timeout")]
    pub query_timeout: String,
    /// Rows kept from a result set; the full row count is still reported
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
            acquire_timeout: default_acquire_timeout(),
            idle_timeout: default_idle_timeout(),
            query_timeout: default_query_timeout(),
            sample_rows: default_sample_rows(),
        }
    }
}

impl StoreConfig {
    pub fn acquire_timeout_duration(&self) -> Duration {
        duration::parse_or(&self.acquire_timeout, Duration::from_secs(5))
    }

    pub fn idle_timeout_duration(&self) -> Duration {
        duration::parse_or(&self.idle_timeout, Duration::from_secs(30))
    }

    pub fn query_timeout_duration(&self) -> Duration {
        duration::parse_or(&self.query_timeout, Duration::from_secs(15))
    }
}

fn default_url() -> String {
    "sqlite://quarry.db".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> String {
    "5s".to_string()
}

fn default_idle_timeout() -> String {
    "30s".to_string()
}

fn default_query_timeout() -> String {
    "15s".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_sample_rows() -> usize {
    50
}
