use thiserror::Error;

/// Quota dispatch errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    /// No eligible backend has capacity for the estimated cost
    #[error("all completion backends are at their usage limits")]
    Exhausted {
        /// Seconds until the earliest backend may have capacity again
        retry_after: u64,
    },

    /// The requested backend is not configured
    #[error("unknown completion backend: {0}")]
    UnknownBackend(String),
}
