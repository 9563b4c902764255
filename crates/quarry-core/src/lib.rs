//! Shared types used across Quarry crates

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod envelope;
mod error;
mod param;

pub use envelope::ErrorEnvelope;
pub use error::HttpError;
pub use param::QueryParam;
