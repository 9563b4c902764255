use serde::{Deserialize, Serialize};

use super::Message;

/// Token usage reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u64,
    /// Tokens generated in the completion
    pub completion_tokens: u64,
}

impl Usage {
    pub const fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(rhs.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(rhs.completion_tokens);
    }
}

/// Request handed to a single backend
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// What a single backend produced
#[derive(Debug, Clone)]
pub struct BackendResponse {
    /// Assistant text
    pub text: String,
    /// Reported token usage, if the backend sent any
    pub usage: Option<Usage>,
    /// Model that actually served the call
    pub model: String,
}

/// Per-call options for [`crate::CompletionClient::complete`]
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Token cost assumed at admission; the configured default when absent
    pub estimated_tokens: Option<u64>,
    /// Pin the call to one backend: no failover happens
    pub preferred_backend: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn estimated(tokens: u64) -> Self {
        Self {
            estimated_tokens: Some(tokens),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = Some(temperature);
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Successful completion
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
    /// Identifier of the backend that answered
    pub backend_id: String,
    pub model: String,
}
