#![allow(clippy::must_use_candidate)]

pub mod analyst;
pub mod cors;
mod duration;
mod env;
pub mod health;
pub mod llm;
mod loader;
pub mod server;
pub mod store;
pub mod telemetry;

use serde::Deserialize;

pub use analyst::*;
pub use cors::*;
pub use health::*;
pub use llm::*;
pub use server::*;
pub use store::*;
pub use telemetry::TelemetryConfig;

/// Top-level Quarry configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Completion backends and quota settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// Relational store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Conversation protocol settings
    #[serde(default)]
    pub analyst: AnalystConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
