use http::StatusCode;
use quarry_catalog::CatalogError;
use quarry_core::HttpError;
use quarry_llm::LlmError;
use quarry_store::StoreError;
use thiserror::Error;

/// Errors surfaced by an analytics turn
#[derive(Debug, Error)]
pub enum AnalystError {
    /// The request carried nothing to answer
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    InvalidFilter(#[from] CatalogError),

    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),

    /// The backend kept proposing a statement the guard refused
    #[error("backend proposed an unsupported statement: {reason}")]
    UnsafeQuery { reason: String },

    /// Every allowed execution of a generated query failed
    #[error("SQL execution failed: {0}")]
    ExecutionFailed(String),

    /// A declared dataset could not be fetched
    #[error("dataset '{id}' failed: {source}")]
    Dataset {
        id: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("invalid analyst configuration: {0}")]
    Config(String),
}

impl HttpError for AnalystError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::UnsafeQuery { .. } => StatusCode::BAD_REQUEST,
            Self::UnknownDataset(_) => StatusCode::NOT_FOUND,
            Self::InvalidFilter(e) => e.status_code(),
            Self::Dataset { source, .. } => source.status_code(),
            Self::Store(e) => e.status_code(),
            Self::Llm(e) => e.status_code(),
            Self::ExecutionFailed(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnknownDataset(_) => "unknown_dataset",
            Self::UnsafeQuery { .. } => "unsafe_query",
            Self::ExecutionFailed(_) => "execution_failed",
            Self::Dataset { .. } => "dataset_failed",
            Self::Config(_) => "internal_error",
            Self::InvalidFilter(e) => e.error_type(),
            Self::Store(e) => e.error_type(),
            Self::Llm(e) => e.error_type(),
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::InvalidRequest(_) | Self::UnknownDataset(_) | Self::ExecutionFailed(_) => self.to_string(),
            Self::UnsafeQuery { .. } => {
                "The assistant proposed an unsupported SQL statement after a retry. Please adjust the request."
                    .to_owned()
            }
            Self::Dataset { id, .. } => format!("failed to fetch dataset '{id}'"),
            Self::Config(_) => "an internal error occurred".to_owned(),
            Self::InvalidFilter(e) => e.client_message(),
            Self::Store(e) => e.client_message(),
            Self::Llm(e) => e.client_message(),
        }
    }
}
