//! Quota-aware completion client
//!
//! Sends a conversation to one of several OpenAI-compatible backends. The
//! [`quarry_quota::QuotaDispatcher`] chooses which backend has room, and the
//! client fails over to the next one when a backend reports it is out of
//! quota.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod backend;
mod client;
pub mod error;
pub mod protocol;
pub mod types;

pub use backend::{CompletionBackend, openai::OpenAiBackend};
pub use client::{CompletionClient, FailoverPolicy};
pub use error::{FailureClass, LlmError};
pub use types::{BackendRequest, BackendResponse, Completion, CompletionOptions, Message, Role, Usage};
