use http::StatusCode;
use quarry_core::HttpError;
use thiserror::Error;

/// Catalog loading and resolution errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unsupported catalog version {0}")]
    UnsupportedVersion(u32),

    #[error("dataset '{0}' is declared more than once")]
    DuplicateDataset(String),

    #[error("dataset '{id}' is invalid: {reason}")]
    InvalidDataset { id: String, reason: String },

    /// A caller named a filter the dataset does not declare
    #[error("dataset '{dataset}' has no filter '{key}'")]
    UnknownFilter { dataset: String, key: String },

    /// A caller filter value could not be coerced or is not allowed
    #[error("invalid value for filter '{key}': {reason}")]
    InvalidFilterValue { key: String, reason: String },
}

impl CatalogError {
    /// Whether the error was caused by caller input rather than the catalog file
    pub const fn is_caller_error(&self) -> bool {
        matches!(self, Self::UnknownFilter { .. } | Self::InvalidFilterValue { .. })
    }
}

impl HttpError for CatalogError {
    fn status_code(&self) -> StatusCode {
        if self.is_caller_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn error_type(&self) -> &str {
        if self.is_caller_error() {
            "invalid_filter"
        } else {
            "internal_error"
        }
    }

    fn client_message(&self) -> String {
        if self.is_caller_error() {
            self.to_string()
        } else {
            "an internal error occurred".to_owned()
        }
    }
}
