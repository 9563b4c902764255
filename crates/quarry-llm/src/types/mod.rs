//! Backend-agnostic completion types
//!
//! Every backend converts its wire format to and from these.

pub mod completion;
pub mod message;

pub use completion::{BackendRequest, BackendResponse, Completion, CompletionOptions, Usage};
pub use message::{Message, Role};
