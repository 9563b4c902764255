//! Backend trait and implementations

pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use quarry_config::{BackendType, LlmConfig};

use crate::error::LlmError;
use crate::types::{BackendRequest, BackendResponse};

/// One completion backend: a model behind an endpoint
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Identifier matching the quota dispatcher's backend id
    fn id(&self) -> &str;

    /// Send a single completion request, without retries
    async fn invoke(&self, request: &BackendRequest) -> Result<BackendResponse, LlmError>;
}

/// Build every configured backend, keeping configuration order
pub fn build_backends(config: &LlmConfig) -> Result<Vec<Arc<dyn CompletionBackend>>, LlmError> {
    let mut backends: Vec<Arc<dyn CompletionBackend>> = Vec::with_capacity(config.backends.len());

    for (id, backend) in &config.backends {
        match backend.backend_type {
            BackendType::Openai => {
                backends.push(Arc::new(openai::OpenAiBackend::new(id.clone(), backend)?));
            }
        }

        tracing::debug!(backend = %id, model = %backend.model, "completion backend configured");
    }

    Ok(backends)
}
