use std::sync::OnceLock;

use http::StatusCode;
use quarry_core::HttpError;
use quarry_quota::QuotaError;
use regex::Regex;
use thiserror::Error;

/// How a failed completion attempt should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The backend is out of quota: cool it down and try another one
    Quota,
    /// Timeouts, connection failures and upstream 5xx
    Transient,
    /// Auth, configuration and malformed exchanges: retrying will not help
    Permanent,
}

/// Errors that can occur during completion calls
#[derive(Debug, Error)]
pub enum LlmError {
    /// No configured backend has capacity for the request
    #[error("all completion backends are at their usage limits")]
    QuotaExhausted {
        /// Seconds until a backend may have capacity again
        retry_after: u64,
    },

    /// The backend rejected the call because of its own rate limits
    #[error("backend {backend} is rate limited: {message}")]
    RateLimited { backend: String, message: String },

    /// Credentials were missing or refused
    #[error("backend {backend} rejected the credentials: {message}")]
    Unauthorized { backend: String, message: String },

    /// The backend refused the request as malformed
    #[error("backend {backend} rejected the request: {message}")]
    InvalidRequest { backend: String, message: String },

    /// The backend failed on its side
    #[error("backend {backend} returned {status}: {message}")]
    Upstream {
        backend: String,
        status: u16,
        message: String,
    },

    /// The call exceeded its timeout
    #[error("backend {backend} timed out")]
    Timeout { backend: String },

    /// The backend could not be reached
    #[error("could not reach backend {backend}: {message}")]
    Connection { backend: String, message: String },

    /// The response could not be understood
    #[error("backend {backend} sent an unreadable response: {message}")]
    MalformedResponse { backend: String, message: String },

    /// The backend answered with no text
    #[error("backend {backend} returned an empty reply")]
    EmptyReply { backend: String },

    /// The requested backend is not configured
    #[error("unknown completion backend: {0}")]
    UnknownBackend(String),

    /// Backend construction failed
    #[error("backend configuration error: {0}")]
    Config(String),
}

/// Body fragments that upstreams use to signal quota exhaustion
fn rate_limit_signature() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)rate[\s_-]?limit|too many requests|quota|tokens per (minute|day)").expect("valid regex")
    })
}

impl LlmError {
    /// Map a non-success HTTP response to an error
    ///
    /// The body is inspected for a rate-limit signature, since some
    /// OpenAI-compatible upstreams report exhaustion with a 4xx other than 429.
    pub fn from_status(backend: &str, status: StatusCode, body: String) -> Self {
        let backend = backend.to_owned();

        if status == StatusCode::TOO_MANY_REQUESTS || rate_limit_signature().is_match(&body) {
            return Self::RateLimited { backend, message: body };
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized { backend, message: body },
            status if status.is_server_error() => Self::Upstream {
                backend,
                status: status.as_u16(),
                message: body,
            },
            _ => Self::InvalidRequest { backend, message: body },
        }
    }

    /// Map a transport-level reqwest failure to an error
    pub fn from_transport(backend: &str, error: &reqwest::Error) -> Self {
        let backend = backend.to_owned();

        if error.is_timeout() {
            Self::Timeout { backend }
        } else if error.is_decode() {
            Self::MalformedResponse {
                backend,
                message: error.to_string(),
            }
        } else {
            Self::Connection {
                backend,
                message: error.to_string(),
            }
        }
    }

    /// Failure class driving cooldown and failover decisions
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::QuotaExhausted { .. } | Self::RateLimited { .. } => FailureClass::Quota,
            Self::Upstream { .. } | Self::Timeout { .. } | Self::Connection { .. } => FailureClass::Transient,
            Self::Unauthorized { .. }
            | Self::InvalidRequest { .. }
            | Self::MalformedResponse { .. }
            | Self::EmptyReply { .. }
            | Self::UnknownBackend(_)
            | Self::Config(_) => FailureClass::Permanent,
        }
    }

    /// Whether the backend signalled quota exhaustion
    pub const fn is_quota_class(&self) -> bool {
        matches!(self.class(), FailureClass::Quota)
    }
}

impl From<QuotaError> for LlmError {
    fn from(error: QuotaError) -> Self {
        match error {
            QuotaError::Exhausted { retry_after } => Self::QuotaExhausted { retry_after },
            QuotaError::UnknownBackend(id) => Self::UnknownBackend(id),
        }
    }
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::QuotaExhausted { .. } | Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UnknownBackend(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized { .. }
            | Self::InvalidRequest { .. }
            | Self::Upstream { .. }
            | Self::Connection { .. }
            | Self::MalformedResponse { .. }
            | Self::EmptyReply { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::QuotaExhausted { .. } | Self::RateLimited { .. } => "quota_exhausted",
            Self::Timeout { .. } | Self::Connection { .. } | Self::Upstream { .. } => "backend_unavailable",
            Self::UnknownBackend(_) => "invalid_request",
            Self::Config(_) => "internal_error",
            Self::Unauthorized { .. }
            | Self::InvalidRequest { .. }
            | Self::MalformedResponse { .. }
            | Self::EmptyReply { .. } => "backend_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::QuotaExhausted { retry_after } => {
                format!("AI service is at capacity, try again in {retry_after}s")
            }
            Self::RateLimited { .. } => "AI service is rate limited, try again shortly".to_owned(),
            Self::Timeout { .. } => "AI service timed out".to_owned(),
            Self::Unauthorized { .. } => "AI service rejected the configured credentials".to_owned(),
            Self::Config(_) => "an internal error occurred".to_owned(),
            Self::UnknownBackend(id) => format!("unknown completion backend: {id}"),
            Self::InvalidRequest { .. }
            | Self::Upstream { .. }
            | Self::Connection { .. }
            | Self::MalformedResponse { .. }
            | Self::EmptyReply { .. } => "AI service error".to_owned(),
        }
    }
}
