//! # convene-core
//!
//! Foundation types shared by every convene crate:
//!
//! - **Branded IDs**: `ParticipantId`, `SessionId`, `TaskId`, `MessageId`, `BotId`
//!   as newtypes so a session id can never be passed where a participant id is expected
//! - **Inbound events**: presence (`join`/`leave`) and chat messages as delivered
//!   by the chat platform
//! - **Broadcast options**: addressing for outbound notices
//! - **Logging**: [`logging::init_subscriber`] for the global `tracing` subscriber

#![deny(unsafe_code)]

pub mod constants;
pub mod events;
pub mod ids;
pub mod logging;

pub use events::{BroadcastOptions, ChatMessage, InboundEvent, Participant, PresenceEvent, PresenceKind};
pub use ids::{BotId, MessageId, ParticipantId, SessionId, TaskId};
pub use logging::LogFormat;
