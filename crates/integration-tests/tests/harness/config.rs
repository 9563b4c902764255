//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use quarry_config::{BackendConfig, BackendType, Config, HealthConfig, QuotaCeilings, ServerConfig};
use secrecy::SecretString;

use super::store::SeededStore;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder pointed at a seeded store and its catalog
    pub fn new(store: &SeededStore) -> Self {
        let mut config = Config {
            server: ServerConfig {
                listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                health: HealthConfig {
                    enabled: true,
                    ..HealthConfig::default()
                },
                ..ServerConfig::default()
            },
            ..Config::default()
        };

        config.store.url = store.url();
        config.analyst.catalog = Some(store.catalog_path());

        Self { config }
    }

    /// Add an OpenAI-compatible backend pointed at a mock
    pub fn with_backend(mut self, id: &str, base_url: &str) -> Self {
        self.config.llm.backends.insert(
            id.to_owned(),
            BackendConfig {
                backend_type: BackendType::Openai,
                model: "mock-model".to_owned(),
                api_key: Some(SecretString::from("test-key")),
                base_url: Some(base_url.parse().expect("valid URL")),
                timeout: "5s".to_owned(),
                quota: QuotaCeilings::default(),
            },
        );
        self
    }

    /// Cap the requests a backend may make per minute
    pub fn with_requests_per_minute(mut self, id: &str, limit: u64) -> Self {
        if let Some(backend) = self.config.llm.backends.get_mut(id) {
            backend.quota.requests_per_minute = Some(limit);
        }
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
