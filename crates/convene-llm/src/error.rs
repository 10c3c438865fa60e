//! Generator error types.

/// Result type alias for generator operations.
pub type GeneratorResult<T> = Result<T, GeneratorError>;

/// Errors a [`Generator`](crate::Generator) can return. The reply scheduler
/// logs them and treats the turn as "no reply".
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend answered with an error status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
    },

    /// The configured API key variable is unset or empty.
    #[error("API key not found in ${0}")]
    MissingApiKey(String),

    /// Generator-specific failure.
    #[error("{0}")]
    Other(String),
}

impl GeneratorError {
    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Json(_) | Self::MissingApiKey(_) | Self::Other(_) => false,
        }
    }

    /// Error category string for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) => "parse",
            Self::Api { status: 401 | 403, .. } | Self::MissingApiKey(_) => "auth",
            Self::Api { status: 429, .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::Other(_) => "unknown",
        }
    }
}
