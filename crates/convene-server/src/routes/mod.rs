//! HTTP routes.

mod bots;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

use crate::bot::BotSupervisor;
use crate::health::{self, HealthResponse};

/// Shared state accessible from handlers.
#[derive(Clone)]
pub struct AppState {
    /// Every running bot.
    pub supervisor: Arc<BotSupervisor>,
    /// When the server started.
    pub start_time: Instant,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/register", post(bots::register))
        .route("/bots/{bot_id}/events", post(bots::post_event))
        .route("/bots/{bot_id}", delete(bots::remove))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.supervisor.len()))
}
