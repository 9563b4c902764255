//! Declared dataset catalog
//!
//! A closed set of pre-vetted, parameterized queries reachable by name.
//! Caller filters are validated against each dataset's declaration and bound
//! as typed parameters; they never become part of the SQL text.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod catalog;
mod error;
mod filter;

pub use catalog::{CATALOG_VERSION, DatasetCatalog, DatasetSpec, ResolvedDataset};
pub use error::CatalogError;
pub use filter::{FilterKind, FilterSpec, Filters};
