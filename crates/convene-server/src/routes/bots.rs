//! Bot registration and event intake.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use convene_core::{BotId, InboundEvent};
use convene_settings::BotSetup;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::AppState;
use crate::error::ServerError;

/// POST /register
pub(super) async fn register(
    State(state): State<AppState>,
    Json(setup): Json<BotSetup>,
) -> Result<(StatusCode, Json<Value>), ServerError> {
    let id = state.supervisor.register(setup).inspect_err(|e| {
        warn!(error = %e, category = e.category(), "registration rejected");
    })?;
    Ok((StatusCode::CREATED, Json(json!({ "botId": id }))))
}

/// POST /bots/{bot_id}/events
pub(super) async fn post_event(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
    Json(event): Json<InboundEvent>,
) -> Result<StatusCode, ServerError> {
    let bot_id = BotId::from(bot_id);
    debug!(bot_id = %bot_id, session_id = %event.session_id(), "event received");
    state.supervisor.dispatch(&bot_id, event)?;
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /bots/{bot_id}
pub(super) async fn remove(State(state): State<AppState>, Path(bot_id): Path<String>) -> Result<StatusCode, ServerError> {
    let bot_id = BotId::from(bot_id);
    if state.supervisor.remove(&bot_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::BotNotFound(bot_id))
    }
}
