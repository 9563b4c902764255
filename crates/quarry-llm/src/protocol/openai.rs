//! `OpenAI` chat completion API wire format types
//!
//! Only the subset Quarry sends and reads. Groq and most self-hosted servers
//! speak the same format.

use serde::{Deserialize, Serialize};

use crate::types::{BackendRequest, BackendResponse, Message, Usage};

// -- Request types --

/// `OpenAI` chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages
    pub messages: Vec<OpenAiMessage>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Always false; replies are read whole
    #[serde(default)]
    pub stream: bool,
}

impl OpenAiRequest {
    pub fn new(model: &str, request: &BackendRequest) -> Self {
        Self {
            model: model.to_owned(),
            messages: request.messages.iter().map(OpenAiMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        }
    }
}

/// `OpenAI` message within a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    /// Message role
    pub role: String,
    /// Text content
    pub content: String,
}

impl From<&Message> for OpenAiMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_owned(),
            content: message.content.clone(),
        }
    }
}

// -- Response types --

/// `OpenAI` chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiResponse {
    /// Response identifier
    #[serde(default)]
    pub id: String,
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Generated choices
    #[serde(default)]
    pub choices: Vec<OpenAiChoice>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
}

/// Choice within an `OpenAI` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChoice {
    /// Choice index
    #[serde(default)]
    pub index: u32,
    /// Generated message
    pub message: OpenAiChoiceMessage,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message within an `OpenAI` response choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChoiceMessage {
    /// Role (always "assistant")
    #[serde(default)]
    pub role: String,
    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Token usage in an `OpenAI` response
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpenAiUsage {
    /// Prompt tokens
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Completion tokens
    #[serde(default)]
    pub completion_tokens: u64,
    /// Total tokens
    #[serde(default)]
    pub total_tokens: u64,
}

impl OpenAiResponse {
    /// Convert to the internal form, keeping only the first choice
    pub fn into_backend_response(self, fallback_model: &str) -> BackendResponse {
        let text = self
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        let model = if self.model.is_empty() {
            fallback_model.to_owned()
        } else {
            self.model
        };

        BackendResponse {
            text,
            usage: self.usage.map(|usage| Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            }),
            model,
        }
    }
}
