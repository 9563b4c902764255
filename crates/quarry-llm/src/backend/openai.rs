//! OpenAI-compatible backend implementation

use async_trait::async_trait;
use quarry_config::BackendConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::CompletionBackend;
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiRequest, OpenAiResponse};
use crate::types::{BackendRequest, BackendResponse};

/// Default base URL: Groq's OpenAI-compatible endpoint
const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// OpenAI-compatible backend
pub struct OpenAiBackend {
    id: String,
    model: String,
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl OpenAiBackend {
    /// Create from backend configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` if the HTTP client cannot be built
    pub fn new(id: String, config: &BackendConfig) -> Result<Self, LlmError> {
        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(DEFAULT_BASE_URL).map_err(|e| LlmError::Config(e.to_string()))?,
        };

        let client = Client::builder()
            .timeout(config.timeout_duration())
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client for backend {id}: {e}")))?;

        Ok(Self {
            id,
            model: config.model.clone(),
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Build the chat completions URL
    fn completions_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, request: &BackendRequest) -> Result<BackendResponse, LlmError> {
        let wire_request = OpenAiRequest::new(&self.model, request);

        let mut builder = self.client.post(self.completions_url()).json(&wire_request);

        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(backend = %self.id, error = %e, "upstream request failed");
            LlmError::from_transport(&self.id, &e)
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                backend = %self.id,
                status = %status,
                "upstream returned error"
            );
            return Err(LlmError::from_status(&self.id, status, body));
        }

        let wire_response: OpenAiResponse = response.json().await.map_err(|e| LlmError::MalformedResponse {
            backend: self.id.clone(),
            message: e.to_string(),
        })?;

        let response = wire_response.into_backend_response(&self.model);

        if response.text.trim().is_empty() {
            return Err(LlmError::EmptyReply {
                backend: self.id.clone(),
            });
        }

        Ok(response)
    }
}
