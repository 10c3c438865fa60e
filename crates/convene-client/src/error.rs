//! Client error types.

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by a [`SessionClient`](crate::SessionClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with a non-success status.
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        /// Request path.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// A required response header was absent.
    #[error("{endpoint} response missing {header} header")]
    MissingHeader {
        /// Request path.
        endpoint: String,
        /// Header name.
        header: &'static str,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response from {endpoint}: {message}")]
    Decode {
        /// Request path.
        endpoint: String,
        /// Error description.
        message: String,
    },

    /// Failure injected by a test double, or raised by a non-HTTP client.
    #[error("{0}")]
    Other(String),
}

impl ClientError {
    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::MissingHeader { .. } | Self::Decode { .. } | Self::Other(_) => false,
        }
    }

    /// Error category string for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) => "network",
            Self::Status { status, .. } if *status == 404 => "not_found",
            Self::Status { .. } => "api",
            Self::MissingHeader { .. } | Self::Decode { .. } => "parse",
            Self::Other(_) => "other",
        }
    }
}
