//! Supervision of running sessions.
//!
//! A session formed by a hand-off is tracked until one of three things ends
//! it: the countdown reaches zero, occupancy drops below the minimum, or the
//! last participant leaves. The first two redirect whoever is still present;
//! only one teardown ever runs per session.

mod countdown;
mod manager;

use std::time::Duration;

use convene_client::Destination;
use convene_core::{ParticipantId, SessionId};

pub use manager::{DepartureOutcome, SessionLifecycleManager};

/// Everything needed to start supervising a session.
#[derive(Clone, Debug)]
pub struct SessionSpec {
    /// The session.
    pub session_id: SessionId,
    /// Initial members.
    pub participants: Vec<ParticipantId>,
    /// Time until the countdown closes the session.
    pub duration: Duration,
    /// Occupancy below which the session is torn down early. `0` disables the
    /// dropout path.
    pub min_occupancy: usize,
    /// Where members go when the countdown ends.
    pub timeout_destination: Destination,
    /// Where members go after a dropout. Falls back to `timeout_destination`.
    pub dropout_destination: Option<Destination>,
}
