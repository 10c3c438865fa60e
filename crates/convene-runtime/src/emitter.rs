//! Broadcast-based emitter for [`RuntimeEvent`]s.
//!
//! Components never call each other. When the coordinator hands a group off,
//! or a session closes, it emits an event; the bot supervisor subscribes and
//! forwards it to whichever component must react.

use std::sync::atomic::{AtomicU64, Ordering};

use convene_core::{MessageId, ParticipantId, SessionId, TaskId};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Why a supervised session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The countdown reached zero.
    Timeout,
    /// Occupancy fell below the minimum.
    Dropout,
    /// The last participant left.
    Empty,
    /// Closed from outside (bot removal, platform).
    External,
}

/// Something a component did that others may need to react to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// A waiting pool reached quorum and its members were moved.
    GroupHandedOff {
        /// Task whose pool was handed off.
        task_id: TaskId,
        /// The waiting session.
        source_session: SessionId,
        /// Freshly provisioned destination.
        destination: SessionId,
        /// Members that arrived, in redirect order.
        participants: Vec<ParticipantId>,
        /// Members whose redirect failed.
        failed: Vec<ParticipantId>,
    },
    /// A waiting pool missed its admission deadline.
    TaskTimedOut {
        /// Task that timed out.
        task_id: TaskId,
        /// Where the waiting participants were sent.
        destination: Option<SessionId>,
        /// Members that were redirected.
        participants: Vec<ParticipantId>,
        /// Members whose redirect failed.
        failed: Vec<ParticipantId>,
    },
    /// A supervised session was torn down.
    SessionClosed {
        /// The session.
        session_id: SessionId,
        /// Why.
        reason: CloseReason,
    },
    /// A generated reply was posted.
    ReplySent {
        /// Session the reply went to.
        session_id: SessionId,
        /// Participant the reply addressed.
        to: ParticipantId,
        /// Message that triggered the generation.
        triggering_message: Option<MessageId>,
    },
    /// An in-flight reply was superseded by newer input.
    ReplyCancelled {
        /// Session.
        session_id: SessionId,
        /// Message whose reply was dropped.
        triggering_message: Option<MessageId>,
    },
}

impl RuntimeEvent {
    /// Event type string for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::GroupHandedOff { .. } => "group_handed_off",
            Self::TaskTimedOut { .. } => "task_timed_out",
            Self::SessionClosed { .. } => "session_closed",
            Self::ReplySent { .. } => "reply_sent",
            Self::ReplyCancelled { .. } => "reply_cancelled",
        }
    }
}

/// Broadcast-based event emitter.
///
/// Non-blocking: `emit` never awaits. Slow receivers lag rather than block
/// the sender.
pub struct EventEmitter {
    tx: broadcast::Sender<RuntimeEvent>,
    emit_count: AtomicU64,
}

impl EventEmitter {
    /// Create a new emitter with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new emitter with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns the number of receivers, 0 if nobody listens.
    pub fn emit(&self, event: RuntimeEvent) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(event = event.event_type(), "runtime event");
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total number of events emitted.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
