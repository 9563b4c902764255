//! Guarded natural-language analytics
//!
//! [`Analyst`] answers a business question in one of two ways. A declared
//! dataset is fetched directly from the catalog and narrated. Anything else
//! goes through a bounded draft, validate and execute loop in which the
//! completion backend proposes a delimited query, the guard checks that it is
//! read-only, and the store runs it.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod error;
mod intent;
mod orchestrator;
mod prompt;
mod request;
mod requirement;

pub use error::AnalystError;
pub use orchestrator::Analyst;
pub use request::{AnalyticsRequest, AnalyticsResponse, DatasetResponse};
