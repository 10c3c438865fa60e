//! Server error types and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use convene_client::ClientError;
use convene_core::BotId;
use convene_settings::SettingsError;
use serde_json::json;

/// Errors surfaced by the HTTP handlers and the bot supervisor.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The registration record failed validation.
    #[error("Invalid bot setup: {0}")]
    Setup(#[from] SettingsError),

    /// The platform client could not be built.
    #[error("Platform client error: {0}")]
    Client(#[from] ClientError),

    /// No bot with this id.
    #[error("Bot not found: {0}")]
    BotNotFound(BotId),

    /// The bot's event queue is at capacity.
    #[error("Event queue full for bot {0}")]
    QueueFull(BotId),

    /// The bot's dispatcher has stopped.
    #[error("Event queue closed for bot {0}")]
    QueueClosed(BotId),

    /// Registration refused: too many bots.
    #[error("Bot limit reached ({0})")]
    TooManyBots(usize),

    /// Listener I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Setup(_) => StatusCode::BAD_REQUEST,
            Self::Client(_) => StatusCode::BAD_GATEWAY,
            Self::BotNotFound(_) => StatusCode::NOT_FOUND,
            Self::QueueFull(_) | Self::QueueClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::TooManyBots(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error category string for logging and response bodies.
    pub fn category(&self) -> &str {
        match self {
            Self::Setup(_) => "invalid_setup",
            Self::Client(_) => "client",
            Self::BotNotFound(_) => "not_found",
            Self::QueueFull(_) => "queue_full",
            Self::QueueClosed(_) => "queue_closed",
            Self::TooManyBots(_) => "too_many_bots",
            Self::Io(_) => "io",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.category(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}
