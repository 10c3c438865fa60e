//! The outbound command contract.

use std::sync::Arc;

use async_trait::async_trait;
use convene_core::{BroadcastOptions, ParticipantId, SessionId, TaskId};

use crate::error::ClientResult;

/// Shared handle to a client, as held by every runtime component.
pub type SharedClient = Arc<dyn SessionClient>;

/// Commands convene issues against the chat platform.
///
/// Implementors must be `Send + Sync`; one client is shared by all components
/// of a bot instance and called from concurrently running background tasks.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Remove `participant` from `session`.
    async fn remove_participant(&self, session: &SessionId, participant: &ParticipantId) -> ClientResult<()>;

    /// Add `participant` to `session`.
    async fn add_participant(&self, session: &SessionId, participant: &ParticipantId) -> ClientResult<()>;

    /// Create a session whose only purpose is to send its occupants to `target_url`.
    async fn create_redirect_session(&self, target_url: &str) -> ClientResult<SessionId>;

    /// Create an empty session to hand a group off to.
    async fn create_session(&self) -> ClientResult<SessionId>;

    /// Post `text` into `session`.
    async fn broadcast(&self, session: &SessionId, text: &str, options: BroadcastOptions) -> ClientResult<()>;

    /// Show or hide the bot's typing indicator in `session`.
    async fn set_composing(&self, session: &SessionId, composing: bool) -> ClientResult<()>;

    /// Tell the platform that `session` is formed and may start.
    async fn announce_session_ready(&self, session: &SessionId) -> ClientResult<()>;

    /// Task the participant was admitted for, if any.
    async fn participant_task(&self, participant: &ParticipantId) -> ClientResult<Option<TaskId>>;
}
