//! Mock LLM backend server for integration tests
//!
//! Implements a minimal OpenAI-compatible chat completions API that plays back
//! a script of replies

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const DEFAULT_REPLY: &str = "Hello from mock LLM";

/// One scripted answer
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// 429 with a Groq-style rate limit body
    RateLimited,
    /// 500 with a generic error body
    ServerError,
}

impl Reply {
    pub fn text(content: &str) -> Self {
        Self::Text(content.to_owned())
    }

    /// Reply carrying a delimited query
    pub fn query(sql: &str) -> Self {
        Self::Text(format!("Let me check.\n<SQL>{sql}</SQL>"))
    }
}

/// Mock LLM backend with predictable replies
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

struct MockLlmState {
    completion_count: AtomicU32,
    /// Played in order; once empty every request gets `fallback`
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    /// Message lists received, in order
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockLlm {
    /// Start a mock that always answers with a fixed greeting
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(Vec::new(), Reply::text(DEFAULT_REPLY)).await
    }

    /// Start a mock that plays `script`, then repeats its last entry
    pub async fn start_scripted(script: Vec<Reply>) -> anyhow::Result<Self> {
        let fallback = script.last().cloned().unwrap_or_else(|| Reply::text(DEFAULT_REPLY));
        Self::start_inner(script, fallback).await
    }

    /// Start a mock that answers every request with `reply`
    pub async fn start_always(reply: Reply) -> anyhow::Result<Self> {
        Self::start_inner(Vec::new(), reply).await
    }

    async fn start_inner(script: Vec<Reply>, fallback: Reply) -> anyhow::Result<Self> {
        let state = Arc::new(MockLlmState {
            completion_count: AtomicU32::new(0),
            script: Mutex::new(script.into()),
            fallback,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for configuring the mock as a backend
    ///
    /// Includes `/v1` since the OpenAI backend appends `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Number of completion requests received
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }

    /// Contents of every message in the `index`th request
    pub fn request_contents(&self, index: usize) -> Vec<String> {
        self.state.requests.lock()[index]
            .iter()
            .map(|message| message.content.clone())
            .collect()
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// -- Wire types matching OpenAI format --

#[derive(Debug, Deserialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessage {
    #[allow(dead_code)]
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionResponse {
    id: String,
    object: String,
    created: u64,
    model: String,
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Debug, Serialize)]
struct Choice {
    index: u32,
    message: ResponseMessage,
    finish_reason: String,
}

#[derive(Debug, Serialize)]
struct ResponseMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// -- Handlers --

async fn handle_chat_completions(
    State(state): State<Arc<MockLlmState>>,
    Json(req): Json<ChatCompletionRequest>,
) -> Response {
    state.completion_count.fetch_add(1, Ordering::Relaxed);
    state.requests.lock().push(req.messages);

    let reply = state
        .script
        .lock()
        .pop_front()
        .unwrap_or_else(|| state.fallback.clone());

    match reply {
        Reply::Text(content) => Json(ChatCompletionResponse {
            id: "chatcmpl-mock".to_owned(),
            object: "chat.completion".to_owned(),
            created: 1_700_000_000,
            model: req.model,
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".to_owned(),
                    content,
                },
                finish_reason: "stop".to_owned(),
            }],
            usage: Usage {
                prompt_tokens: 100,
                completion_tokens: 20,
                total_tokens: 120,
            },
        })
        .into_response(),
        Reply::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": {
                    "message": "Rate limit reached for model `mock-model` on tokens per day (TPD). Please try again in 7m12s.",
                    "type": "tokens",
                    "code": "rate_limit_exceeded"
                }
            })),
        )
            .into_response(),
        Reply::ServerError => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": {
                    "message": "mock server intentional failure",
                    "type": "server_error"
                }
            })),
        )
            .into_response(),
    }
}
