use std::time::Duration;

use http::StatusCode;
use quarry_core::HttpError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// The pool could not be created
    #[error("failed to open store: {0}")]
    Connect(#[source] sqlx::Error),

    /// The database refused or failed the statement
    #[error("{0}")]
    Query(String),

    /// The statement ran past the configured timeout
    #[error("query exceeded {}s timeout", .0.as_secs())]
    Timeout(Duration),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            // Keep the database's own wording, it is what a model can act on
            sqlx::Error::Database(db) => Self::Query(db.message().to_owned()),
            other => Self::Query(other.to_string()),
        }
    }
}

impl HttpError for StoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Connect(_) | Self::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Timeout(_) => "store_timeout",
            Self::Connect(_) | Self::Query(_) => "store_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Timeout(_) => "the query took too long".to_owned(),
            Self::Connect(_) | Self::Query(_) => "the query could not be executed".to_owned(),
        }
    }
}
