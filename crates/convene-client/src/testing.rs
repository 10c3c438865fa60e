//! In-memory [`SessionClient`] for tests.
//!
//! Records every call in order, mints session ids on demand, and can be told
//! to fail specific participants' removals or additions.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use convene_core::{BroadcastOptions, ParticipantId, SessionId, TaskId};
use parking_lot::Mutex;

use crate::client::SessionClient;
use crate::error::{ClientError, ClientResult};

/// One recorded call.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Call {
    Remove { session: SessionId, participant: ParticipantId },
    Add { session: SessionId, participant: ParticipantId },
    CreateRedirect { url: String },
    CreateSession,
    Broadcast { session: SessionId, text: String, options: BroadcastOptions },
    Composing { session: SessionId, composing: bool },
    Ready { session: SessionId },
    Task { participant: ParticipantId },
}

/// Recording test double.
#[derive(Default)]
pub struct RecordingClient {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicU64,
    failing_removes: Mutex<HashSet<ParticipantId>>,
    failing_adds: Mutex<HashSet<ParticipantId>>,
    tasks: Mutex<HashMap<ParticipantId, TaskId>>,
}

impl RecordingClient {
    /// Empty client that succeeds at everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `remove_participant` fail for `participant`.
    pub fn fail_remove_for(&self, participant: impl Into<ParticipantId>) {
        let _ = self.failing_removes.lock().insert(participant.into());
    }

    /// Make `add_participant` fail for `participant`.
    pub fn fail_add_for(&self, participant: impl Into<ParticipantId>) {
        let _ = self.failing_adds.lock().insert(participant.into());
    }

    /// Answer `participant_task` for `participant` with `task`.
    pub fn set_task(&self, participant: impl Into<ParticipantId>, task: impl Into<TaskId>) {
        let _ = self.tasks.lock().insert(participant.into(), task.into());
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Successful and failed additions, in order.
    pub fn adds(&self) -> Vec<(SessionId, ParticipantId)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Add { session, participant } => Some((session.clone(), participant.clone())),
                _ => None,
            })
            .collect()
    }

    /// Broadcasts, in order.
    pub fn broadcasts(&self) -> Vec<(SessionId, String, BroadcastOptions)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Broadcast { session, text, options } => Some((session.clone(), text.clone(), options.clone())),
                _ => None,
            })
            .collect()
    }

    /// Texts broadcast into `session`.
    pub fn texts_in(&self, session: &SessionId) -> Vec<String> {
        self.broadcasts()
            .into_iter()
            .filter(|(s, _, _)| s == session)
            .map(|(_, text, _)| text)
            .collect()
    }

    /// Composing indicator changes in `session`.
    pub fn composing_in(&self, session: &SessionId) -> Vec<bool> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Composing { session: s, composing } if s == session => Some(*composing),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn mint(&self, prefix: &str) -> SessionId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        SessionId::from(format!("{prefix}-{n}"))
    }
}

#[async_trait]
impl SessionClient for RecordingClient {
    async fn remove_participant(&self, session: &SessionId, participant: &ParticipantId) -> ClientResult<()> {
        self.record(Call::Remove {
            session: session.clone(),
            participant: participant.clone(),
        });
        if self.failing_removes.lock().contains(participant) {
            return Err(ClientError::Other(format!("remove {participant} refused")));
        }
        Ok(())
    }

    async fn add_participant(&self, session: &SessionId, participant: &ParticipantId) -> ClientResult<()> {
        self.record(Call::Add {
            session: session.clone(),
            participant: participant.clone(),
        });
        if self.failing_adds.lock().contains(participant) {
            return Err(ClientError::Other(format!("add {participant} refused")));
        }
        Ok(())
    }

    async fn create_redirect_session(&self, target_url: &str) -> ClientResult<SessionId> {
        self.record(Call::CreateRedirect {
            url: target_url.to_string(),
        });
        Ok(self.mint("redirect"))
    }

    async fn create_session(&self) -> ClientResult<SessionId> {
        self.record(Call::CreateSession);
        Ok(self.mint("session"))
    }

    async fn broadcast(&self, session: &SessionId, text: &str, options: BroadcastOptions) -> ClientResult<()> {
        self.record(Call::Broadcast {
            session: session.clone(),
            text: text.to_string(),
            options,
        });
        Ok(())
    }

    async fn set_composing(&self, session: &SessionId, composing: bool) -> ClientResult<()> {
        self.record(Call::Composing {
            session: session.clone(),
            composing,
        });
        Ok(())
    }

    async fn announce_session_ready(&self, session: &SessionId) -> ClientResult<()> {
        self.record(Call::Ready {
            session: session.clone(),
        });
        Ok(())
    }

    async fn participant_task(&self, participant: &ParticipantId) -> ClientResult<Option<TaskId>> {
        self.record(Call::Task {
            participant: participant.clone(),
        });
        Ok(self.tasks.lock().get(participant).cloned())
    }
}
