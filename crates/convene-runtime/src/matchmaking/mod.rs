//! Waiting pools and quorum hand-off.
//!
//! One pool per task. Participants join the pool's waiting session; when the
//! pool holds `quorum` members they are all moved to a freshly provisioned
//! session. If the quorum is not reached within `timeout` of the first join,
//! the admission watchdog sends everyone still waiting to the timeout
//! destination instead. Exactly one of the two happens per pool.

mod coordinator;
mod handoff;
mod watchdog;

use std::time::Duration;

use convene_client::Destination;
use convene_core::{SessionId, TaskId};

pub use coordinator::{JoinOutcome, LeaveOutcome, MatchmakingCoordinator};

/// Pool parameters shared by every task of a bot, for tasks not configured
/// explicitly.
#[derive(Clone, Debug)]
pub struct TaskTemplate {
    /// Members needed for a hand-off.
    pub quorum: usize,
    /// The waiting session.
    pub source_session: SessionId,
    /// Admission deadline, counted from the first join.
    pub timeout: Duration,
    /// Where waiting members go when the deadline passes.
    pub timeout_destination: Destination,
}

impl TaskTemplate {
    /// Concrete configuration for `task_id`.
    pub fn for_task(&self, task_id: TaskId) -> TaskConfig {
        TaskConfig {
            task_id,
            quorum: self.quorum,
            source_session: self.source_session.clone(),
            timeout: self.timeout,
            timeout_destination: self.timeout_destination.clone(),
        }
    }
}

/// Pool parameters of one task.
#[derive(Clone, Debug)]
pub struct TaskConfig {
    /// The task.
    pub task_id: TaskId,
    /// Members needed for a hand-off.
    pub quorum: usize,
    /// The waiting session.
    pub source_session: SessionId,
    /// Admission deadline, counted from the first join.
    pub timeout: Duration,
    /// Where waiting members go when the deadline passes.
    pub timeout_destination: Destination,
}
