//! The generator contract.

use std::sync::Arc;

use async_trait::async_trait;
use convene_core::{ChatMessage, Participant, SessionId};

use crate::error::GeneratorResult;

/// Shared handle to a generator.
pub type SharedGenerator = Arc<dyn Generator>;

/// Input to one generation: a snapshot of the session transcript.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    /// Session the reply is for.
    pub session_id: SessionId,
    /// The bot itself, so backends can tell its own lines apart.
    pub bot: Participant,
    /// Transcript, oldest first. Includes the bot's earlier replies.
    pub transcript: Vec<ChatMessage>,
}

impl GenerationRequest {
    /// Whether `message` was written by the bot.
    pub fn is_bot(&self, message: &ChatMessage) -> bool {
        message.sender.id == self.bot.id
    }

    /// Most recent message not written by the bot.
    pub fn last_participant_message(&self) -> Option<&ChatMessage> {
        self.transcript.iter().rev().find(|m| !self.is_bot(m))
    }
}

/// Text-in/text-out reply backend.
///
/// `Ok(None)` means the backend chose not to answer. Latency is unbounded;
/// callers race the future against cancellation rather than a timeout.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Produce a reply to the transcript, or `None` to stay silent.
    async fn generate(&self, request: &GenerationRequest) -> GeneratorResult<Option<String>>;
}
