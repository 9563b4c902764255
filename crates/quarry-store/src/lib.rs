//! Read-only relational store
//!
//! [`QueryStore`] is the boundary the analyst executes queries through.
//! [`SqliteStore`] is the shipped implementation: a sqlx pool whose
//! connections are opened read-only, so writes fail at the database even if
//! they slip past the guard.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod error;
mod result;
mod sqlite;

use async_trait::async_trait;
use quarry_core::QueryParam;

pub use error::StoreError;
pub use result::{ColumnSchema, ExecutionResult, Row, TableSchema};
pub use sqlite::SqliteStore;

/// A store that runs bound, read-only queries
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Run `query` with positional `params`, keeping at most the configured sample of rows
    async fn execute(&self, query: &str, params: &[QueryParam]) -> Result<ExecutionResult, StoreError>;

    /// Tables and columns visible to queries
    async fn schema(&self) -> Result<Vec<TableSchema>, StoreError>;
}
