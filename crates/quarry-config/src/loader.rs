use std::path::Path;

use crate::{Config, duration};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no backend is configured, a backend is
    /// malformed, or protocol bounds are unusable
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_llm_config()?;
        self.validate_store_config()?;
        self.validate_analyst_config()?;
        Ok(())
    }

    /// Validate backend definitions and quota ceilings
    fn validate_llm_config(&self) -> anyhow::Result<()> {
        if self.llm.backends.is_empty() {
            anyhow::bail!("at least one completion backend must be configured under [llm.backends]");
        }

        duration::parse(&self.llm.cooldown).map_err(|e| anyhow::anyhow!("llm.cooldown: {e}"))?;

        for (id, backend) in &self.llm.backends {
            if backend.model.trim().is_empty() {
                anyhow::bail!("backend '{id}' must name a model");
            }

            duration::parse(&backend.timeout).map_err(|e| anyhow::anyhow!("backend '{id}' timeout: {e}"))?;

            let ceilings = [
                ("requests_per_minute", backend.quota.requests_per_minute),
                ("requests_per_day", backend.quota.requests_per_day),
                ("tokens_per_minute", backend.quota.tokens_per_minute),
                ("tokens_per_day", backend.quota.tokens_per_day),
            ];

            for (name, ceiling) in ceilings {
                if ceiling == Some(0) {
                    anyhow::bail!("backend '{id}' quota.{name} must be greater than 0 when set");
                }
            }
        }

        Ok(())
    }

    fn validate_store_config(&self) -> anyhow::Result<()> {
        let store = &self.store;

        if store.max_connections == 0 {
            anyhow::bail!("store.max_connections must be greater than 0");
        }

        if store.sample_rows == 0 {
            anyhow::bail!("store.sample_rows must be greater than 0");
        }

        duration::parse(&store.acquire_timeout).map_err(|e| anyhow::anyhow!("store.acquire_timeout: {e}"))?;
        duration::parse(&store.idle_timeout).map_err(|e| anyhow::anyhow!("store.idle_timeout: {e}"))?;
        duration::parse(&store.query_timeout).map_err(|e| anyhow::anyhow!("store.query_timeout: {e}"))?;

        Ok(())
    }

    fn validate_analyst_config(&self) -> anyhow::Result<()> {
        let analyst = &self.analyst;

        if analyst.draft_attempts == 0 {
            anyhow::bail!("analyst.draft_attempts must be at least 1");
        }

        if analyst.execution_attempts == 0 {
            anyhow::bail!("analyst.execution_attempts must be at least 1");
        }

        if !(0.0..=2.0).contains(&analyst.temperature) {
            anyhow::bail!("analyst.temperature must be between 0.0 and 2.0");
        }

        for requirement in &analyst.requirements {
            regex::Regex::new(&requirement.pattern)
                .map_err(|e| anyhow::anyhow!("invalid requirement pattern '{}': {e}", requirement.pattern))?;

            if requirement.columns.is_empty() {
                anyhow::bail!("requirement '{}' must list at least one column", requirement.pattern);
            }
        }

        Ok(())
    }
}
