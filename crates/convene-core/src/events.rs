//! Inbound events delivered by the chat platform, and outbound addressing.
//!
//! Two inbound families:
//!
//! - **[`PresenceEvent`]**: a participant joined or left a session.
//! - **[`ChatMessage`]**: a participant posted text into a session.
//!
//! Both arrive wrapped in [`InboundEvent`], tagged by `"type"`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, ParticipantId, SessionId};

/// A participant as seen by the chat platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Platform-assigned id.
    pub id: ParticipantId,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

impl Participant {
    /// Build a participant from an id and display name.
    pub fn new(id: impl Into<ParticipantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Whether a participant entered or left a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceKind {
    /// Participant connected to the session.
    Join,
    /// Participant disconnected from the session.
    Leave,
}

/// A join or leave observed in one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    /// Join or leave.
    pub kind: PresenceKind,
    /// Who moved.
    pub participant: Participant,
    /// Where.
    pub session_id: SessionId,
}

impl PresenceEvent {
    /// Shorthand for a join event.
    pub fn join(participant: Participant, session_id: impl Into<SessionId>) -> Self {
        Self {
            kind: PresenceKind::Join,
            participant,
            session_id: session_id.into(),
        }
    }

    /// Shorthand for a leave event.
    pub fn leave(participant: Participant, session_id: impl Into<SessionId>) -> Self {
        Self {
            kind: PresenceKind::Leave,
            participant,
            session_id: session_id.into(),
        }
    }
}

/// A text message posted into a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Platform message id, when the platform supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Session the message was posted into.
    pub session_id: SessionId,
    /// Author.
    pub sender: Participant,
    /// Message body.
    pub text: String,
    /// Receive time. Defaults to the moment of deserialization.
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a message received now, without a platform id.
    pub fn new(session_id: impl Into<SessionId>, sender: Participant, text: impl Into<String>) -> Self {
        Self {
            id: None,
            session_id: session_id.into(),
            sender,
            text: text.into(),
            received_at: Utc::now(),
        }
    }

    /// Attach a platform message id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Everything the platform can push at a bot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Join or leave.
    Presence(PresenceEvent),
    /// Chat text.
    Message(ChatMessage),
}

impl InboundEvent {
    /// Session the event belongs to.
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Presence(p) => &p.session_id,
            Self::Message(m) => &m.session_id,
        }
    }

    /// Participant that caused the event.
    pub fn participant(&self) -> &Participant {
        match self {
            Self::Presence(p) => &p.participant,
            Self::Message(m) => &m.sender,
        }
    }
}

/// Addressing and retention of an outbound notice.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastOptions {
    /// Deliver only to this participant instead of the whole session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_participant: Option<ParticipantId>,
    /// Keep the notice in the session history.
    #[serde(default)]
    pub persistent: bool,
}

impl BroadcastOptions {
    /// Session-wide, non-persistent.
    pub fn everyone() -> Self {
        Self::default()
    }

    /// Addressed to a single participant.
    pub fn to(participant: impl Into<ParticipantId>) -> Self {
        Self {
            to_participant: Some(participant.into()),
            persistent: false,
        }
    }

    /// Mark as persistent.
    #[must_use]
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn presence_from_platform_json() {
        let json = r#"{
            "type": "presence",
            "kind": "join",
            "participant": {"id": 17, "name": "alice"},
            "sessionId": 4
        }"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        assert_matches!(&event, InboundEvent::Presence(p) if p.kind == PresenceKind::Join);
        assert_eq!(event.session_id().as_str(), "4");
        assert_eq!(event.participant().id.as_str(), "17");
    }

    #[test]
    fn message_without_id_gets_timestamp() {
        let json = r#"{
            "type": "message",
            "sessionId": "r1",
            "sender": {"id": "u1", "name": "bob"},
            "text": "hi"
        }"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        let InboundEvent::Message(msg) = event else {
            panic!("expected message");
        };
        assert!(msg.id.is_none());
        assert_eq!(msg.text, "hi");
        assert!(msg.received_at <= Utc::now());
    }

    #[test]
    fn participant_name_defaults_to_empty() {
        let p: Participant = serde_json::from_str(r#"{"id": 3}"#).unwrap();
        assert_eq!(p.name, "");
    }

    #[test]
    fn unknown_type_rejected() {
        let json = r#"{"type": "typing", "sessionId": "r1"}"#;
        assert!(serde_json::from_str::<InboundEvent>(json).is_err());
    }

    #[test]
    fn broadcast_options_builders() {
        let opts = BroadcastOptions::to("u9").persistent();
        assert_eq!(opts.to_participant, Some(ParticipantId::from("u9")));
        assert!(opts.persistent);
        assert_eq!(BroadcastOptions::everyone(), BroadcastOptions::default());
    }

    #[test]
    fn broadcast_options_omit_absent_recipient() {
        let json = serde_json::to_value(BroadcastOptions::everyone()).unwrap();
        assert_eq!(json, serde_json::json!({"persistent": false}));
    }

    #[test]
    fn message_with_id() {
        let msg = ChatMessage::new("r1", Participant::new("u1", "a"), "x").with_id("m1");
        assert_eq!(msg.id, Some(MessageId::from("m1")));
    }
}
