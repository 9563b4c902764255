//! Guards between generated text and the store
//!
//! Extraction pulls a query candidate out of a model reply, classification
//! decides whether it is a single read-only statement, and markup stripping
//! cleans a reply before it is shown to a person. Each step is a pure
//! function and none of them trusts the others.

#![allow(clippy::must_use_candidate)]

mod classify;
mod extract;
mod markup;

pub use classify::{Rejection, classify, is_read_only};
pub use extract::{extract_candidate, normalize, wrap_candidate};
pub use markup::strip_internal_markup;

/// Opening delimiter of a proposed query
pub const OPEN_DELIMITER: &str = "<SQL>";

/// Closing delimiter of a proposed query
pub const CLOSE_DELIMITER: &str = "</SQL>";
