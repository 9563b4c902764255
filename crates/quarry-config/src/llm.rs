use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::duration;

const DEFAULT_COOLDOWN: Duration = Duration::from_secs(120);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Completion backend configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Token cost assumed for a call when the caller gives no estimate
    #[serde(default = "default_estimated_tokens")]
    pub default_estimated_tokens: u64,
    /// How long a backend is skipped after it reports quota exhaustion (e.g. "2m")
    #[serde(default = "default_cooldown")]
    pub cooldown: String,
    /// Failover behaviour across backends
    #[serde(default)]
    pub failover: FailoverConfig,
    /// Backends keyed by identifier, in priority order
    #[serde(default)]
    pub backends: IndexMap<String, BackendConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_estimated_tokens: default_estimated_tokens(),
            cooldown: default_cooldown(),
            failover: FailoverConfig::default(),
            backends: IndexMap::new(),
        }
    }
}

impl LlmConfig {
    /// Cooldown applied after a quota-class failure
    pub fn cooldown_duration(&self) -> Duration {
        duration::parse_or(&self.cooldown, DEFAULT_COOLDOWN)
    }
}

/// Failover configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailoverConfig {
    /// Also fail over on timeouts, connection errors and upstream 5xx
    ///
    /// Off by default: only quota-class failures move on to the next backend.
    #[serde(default)]
    pub retry_transient: bool,
}

/// A single completion backend: one model behind one endpoint
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Backend protocol type
    #[serde(rename = "type", default)]
    pub backend_type: BackendType,
    /// Upstream model name sent with every request
    pub model: String,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Per-call timeout (e.g. "30s")
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Usage ceilings; an absent ceiling is unbounded
    #[serde(default)]
    pub quota: QuotaCeilings,
}

impl BackendConfig {
    /// Per-call timeout
    pub fn timeout_duration(&self) -> Duration {
        duration::parse_or(&self.timeout, DEFAULT_TIMEOUT)
    }
}

/// Supported backend protocols
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// OpenAI-compatible chat completions API (Groq, OpenAI, vLLM, ...)
    #[default]
    Openai,
}

/// Per-backend quota ceilings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaCeilings {
    #[serde(default)]
    pub requests_per_minute: Option<u64>,
    #[serde(default)]
    pub requests_per_day: Option<u64>,
    #[serde(default)]
    pub tokens_per_minute: Option<u64>,
    #[serde(default)]
    pub tokens_per_day: Option<u64>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_estimated_tokens() -> u64 {
    3500
}

fn default_cooldown() -> String {
    "2m".to_string()
}

fn default_timeout() -> String {
    "30s".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backends_keep_priority_order() {
        let config: LlmConfig = toml::from_str(
            r#"
            [backends.versatile]
            model = "llama-3.3-70b-versatile"
            [backends.versatile.quota]
            requests_per_minute = 30
            tokens_per_day = 100000

            [backends.instant]
            model = "llama-3.1-8b-instant"
            timeout = "10s"
            "#,
        )
        .unwrap();

        let ids: Vec<_> = config.backends.keys().cloned().collect();
        assert_eq!(ids, ["versatile", "instant"]);

        let versatile = &config.backends["versatile"];
        assert_eq!(versatile.backend_type, BackendType::Openai);
        assert_eq!(versatile.quota.requests_per_minute, Some(30));
        assert_eq!(versatile.quota.requests_per_day, None);
        assert_eq!(versatile.timeout_duration(), Duration::from_secs(30));

        assert_eq!(config.backends["instant"].timeout_duration(), Duration::from_secs(10));
    }

    #[test]
    fn defaults_follow_groq_free_tier_usage() {
        let config = LlmConfig::default();
        assert_eq!(config.default_estimated_tokens, 3500);
        assert_eq!(config.cooldown_duration(), Duration::from_secs(120));
        assert!(!config.failover.retry_transient);
    }
}
