use serde::Serialize;

use crate::HttpError;

/// Caller-facing failure body: `{"success": false, "error": "...", "type": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_type: error_type.into(),
        }
    }

    /// Build the envelope from a domain error, exposing only its client message
    pub fn from_error<E: HttpError + ?Sized>(error: &E) -> Self {
        Self::new(error.client_message(), error.error_type())
    }
}
