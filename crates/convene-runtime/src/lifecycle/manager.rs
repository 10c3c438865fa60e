use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use convene_client::{Destination, Redirector};
use convene_core::{BroadcastOptions, Participant, ParticipantId, SessionId};
use convene_settings::{LifecycleSettings, render_notice};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::SessionSpec;
use super::countdown::{Teardown, countdown, tear_down};
use crate::emitter::{CloseReason, EventEmitter, RuntimeEvent};
use crate::registry::TaskRegistry;

/// Result of [`SessionLifecycleManager::on_leave`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DepartureOutcome {
    /// The session is not supervised.
    NotTracked,
    /// The participant was not a member.
    NotMember,
    /// A teardown is already running; nothing changes.
    Ignored,
    /// The last participant left; the session closed silently.
    Empty,
    /// Occupancy fell below the minimum; the dropout teardown started.
    Dropout {
        /// Members still present.
        remaining: usize,
    },
    /// The session continues.
    Left {
        /// Members still present.
        remaining: usize,
    },
}

pub(super) struct ActiveSession {
    pub(super) participants: BTreeSet<ParticipantId>,
    pub(super) deadline: Instant,
    pub(super) teardown_in_progress: bool,
    pub(super) epoch: u64,
    pub(super) min_occupancy: usize,
    pub(super) timeout_destination: Destination,
    dropout_destination: Option<Destination>,
}

pub(super) struct Inner {
    pub(super) sessions: Mutex<HashMap<SessionId, ActiveSession>>,
    pub(super) settings: LifecycleSettings,
    pub(super) redirector: Redirector,
    registry: Arc<TaskRegistry>,
    pub(super) emitter: Arc<EventEmitter>,
    next_epoch: AtomicU64,
}

impl ActiveSession {
    pub(super) fn members(&self) -> Vec<ParticipantId> {
        self.participants.iter().cloned().collect()
    }
}

impl Inner {
    pub(super) async fn notify(&self, session: &SessionId, text: &str) {
        if let Err(e) = self
            .redirector
            .client()
            .broadcast(session, text, BroadcastOptions::everyone())
            .await
        {
            warn!(session_id = %session, error = %e, "notice not delivered");
        }
    }
}

fn countdown_key(session: &SessionId) -> String {
    format!("countdown:{session}")
}

fn dropout_key(session: &SessionId) -> String {
    format!("dropout:{session}")
}

/// Supervises every running session of one bot.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionLifecycleManager {
    inner: Arc<Inner>,
}

impl SessionLifecycleManager {
    /// Create a manager.
    pub fn new(
        settings: LifecycleSettings,
        redirector: Redirector,
        registry: Arc<TaskRegistry>,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                settings,
                redirector,
                registry,
                emitter,
                next_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Start supervising a session and its countdown.
    ///
    /// A session that is already supervised absorbs the new participants and
    /// keeps its running deadline. A session still in its teardown is
    /// supervised afresh; the teardown finishes with the members it froze.
    /// Returns `true` when a new countdown started.
    #[instrument(skip_all, fields(session_id = %spec.session_id))]
    pub fn on_session_formed(&self, spec: SessionSpec) -> bool {
        let SessionSpec {
            session_id,
            participants,
            duration,
            min_occupancy,
            timeout_destination,
            dropout_destination,
        } = spec;

        let epoch = {
            let mut sessions = self.inner.sessions.lock();
            if let Some(active) = sessions.get_mut(&session_id) {
                if !active.teardown_in_progress {
                    active.participants.extend(participants);
                    debug!(members = active.participants.len(), "group merged into running session");
                    return false;
                }
            }
            let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
            let _ = sessions.insert(
                session_id.clone(),
                ActiveSession {
                    participants: participants.into_iter().collect(),
                    deadline: Instant::now() + duration,
                    teardown_in_progress: false,
                    epoch,
                    min_occupancy,
                    timeout_destination,
                    dropout_destination,
                },
            );
            epoch
        };

        info!(duration_secs = duration.as_secs(), min_occupancy, "session supervised");
        let inner = Arc::clone(&self.inner);
        let _ = self
            .inner
            .registry
            .spawn(countdown_key(&session_id), countdown(inner, session_id, epoch));
        true
    }

    /// Re-admit a participant who reconnected. Refused while tearing down.
    pub fn on_join(&self, session: &SessionId, participant: &ParticipantId) -> bool {
        let mut sessions = self.inner.sessions.lock();
        match sessions.get_mut(session) {
            Some(active) if !active.teardown_in_progress => {
                let _ = active.participants.insert(participant.clone());
                true
            }
            _ => false,
        }
    }

    /// Remove `participant` and react to the new occupancy.
    #[instrument(skip_all, fields(session_id = %session, participant_id = %participant.id))]
    pub fn on_leave(&self, session: &SessionId, participant: &Participant) -> DepartureOutcome {
        let (outcome, dropout_to) = {
            let mut sessions = self.inner.sessions.lock();
            let Some(active) = sessions.get_mut(session) else {
                return DepartureOutcome::NotTracked;
            };
            if active.teardown_in_progress {
                return DepartureOutcome::Ignored;
            }
            if !active.participants.remove(&participant.id) {
                return DepartureOutcome::NotMember;
            }

            let remaining = active.participants.len();
            if remaining == 0 {
                let _ = sessions.remove(session);
                (DepartureOutcome::Empty, None)
            } else if remaining < active.min_occupancy {
                active.teardown_in_progress = true;
                let to = active
                    .dropout_destination
                    .clone()
                    .unwrap_or_else(|| active.timeout_destination.clone());
                (DepartureOutcome::Dropout { remaining }, Some((to, active.epoch, active.members())))
            } else {
                (DepartureOutcome::Left { remaining }, None)
            }
        };

        match (&outcome, dropout_to) {
            (DepartureOutcome::Empty, _) => {
                let _ = self.inner.registry.cancel(&countdown_key(session));
                info!("last participant left, session closed");
                let _ = self.inner.emitter.emit(RuntimeEvent::SessionClosed {
                    session_id: session.clone(),
                    reason: CloseReason::Empty,
                });
            }
            (DepartureOutcome::Dropout { remaining }, Some((to, epoch, present))) => {
                info!(remaining, "occupancy below minimum, closing session");
                let _ = self.inner.registry.cancel(&countdown_key(session));
                let inner = Arc::clone(&self.inner);
                let session = session.clone();
                let _ = self.inner.registry.spawn(dropout_key(&session), async move {
                    let teardown = Teardown {
                        session: &session,
                        epoch,
                        present,
                        destination: &to,
                        reason: CloseReason::Dropout,
                    };
                    let notice = inner.settings.dropout_notice.clone();
                    tear_down(&inner, teardown, &notice).await;
                });
            }
            (DepartureOutcome::Left { remaining }, _) => {
                debug!(remaining, "participant left");
                let text = render_notice(&self.inner.settings.left_notice, &[("name", participant.name.as_str())]);
                let inner = Arc::clone(&self.inner);
                let session = session.clone();
                let _ = self
                    .inner
                    .registry
                    .spawn(format!("left:{session}:{}", participant.id), async move {
                        inner.notify(&session, &text).await;
                    });
            }
            _ => {}
        }
        outcome
    }

    /// Stop supervising `session` without redirecting anyone.
    pub fn close_session(&self, session: &SessionId) -> bool {
        let _ = self.inner.registry.cancel(&countdown_key(session));
        let _ = self.inner.registry.cancel(&dropout_key(session));
        if self.inner.sessions.lock().remove(session).is_none() {
            return false;
        }
        info!(session_id = %session, "session closed externally");
        let _ = self.inner.emitter.emit(RuntimeEvent::SessionClosed {
            session_id: session.clone(),
            reason: CloseReason::External,
        });
        true
    }

    /// Whether `session` is supervised.
    pub fn is_active(&self, session: &SessionId) -> bool {
        self.inner.sessions.lock().contains_key(session)
    }

    /// Current members of `session`, ascending.
    pub fn participants(&self, session: &SessionId) -> Vec<ParticipantId> {
        self.inner
            .sessions
            .lock()
            .get(session)
            .map(|active| active.participants.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Time left on `session`'s countdown.
    pub fn remaining(&self, session: &SessionId) -> Option<std::time::Duration> {
        self.inner
            .sessions
            .lock()
            .get(session)
            .map(|active| active.deadline.saturating_duration_since(Instant::now()))
    }

    /// Number of supervised sessions.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use convene_client::testing::RecordingClient;
    use tokio::sync::broadcast;

    use super::*;

    struct Harness {
        manager: SessionLifecycleManager,
        client: Arc<RecordingClient>,
        registry: Arc<TaskRegistry>,
        events: broadcast::Receiver<RuntimeEvent>,
    }

    fn harness() -> Harness {
        let client = Arc::new(RecordingClient::new());
        let registry = Arc::new(TaskRegistry::new());
        let emitter = Arc::new(EventEmitter::new());
        let events = emitter.subscribe();
        let manager = SessionLifecycleManager::new(
            LifecycleSettings::default(),
            Redirector::new(client.clone()),
            Arc::clone(&registry),
            emitter,
        );
        Harness {
            manager,
            client,
            registry,
            events,
        }
    }

    fn spec(members: &[&str], secs: u64, min_occupancy: usize) -> SessionSpec {
        SessionSpec {
            session_id: "chat".into(),
            participants: members.iter().map(|m| ParticipantId::from(*m)).collect(),
            duration: Duration::from_secs(secs),
            min_occupancy,
            timeout_destination: Destination::Url("https://survey.example/done".into()),
            dropout_destination: Some(Destination::Session("lobby".into())),
        }
    }

    fn who(id: &str) -> Participant {
        Participant::new(id, format!("user-{id}"))
    }

    fn chat() -> SessionId {
        "chat".into()
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_time_broadcast_every_twenty_ticks() {
        let h = harness();
        assert!(h.manager.on_session_formed(spec(&["a", "b"], 60, 0)));

        tokio::time::sleep(Duration::from_millis(19_500)).await;
        assert!(h.client.texts_in(&chat()).is_empty());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.client.texts_in(&chat()), vec!["40 seconds left".to_owned()]);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(
            h.client.texts_in(&chat()),
            vec!["40 seconds left".to_owned(), "20 seconds left".to_owned()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_redirects_everyone_at_zero() {
        let mut h = harness();
        let start = Instant::now();
        let _ = h.manager.on_session_formed(spec(&["b", "a"], 5, 0));

        let event = h.events.recv().await.unwrap();
        assert_eq!(
            event,
            RuntimeEvent::SessionClosed {
                session_id: chat(),
                reason: CloseReason::Timeout
            }
        );
        assert!(start.elapsed() >= Duration::from_secs(8));
        assert_eq!(
            h.client.adds(),
            vec![("redirect-1".into(), "a".into()), ("redirect-1".into(), "b".into())]
        );
        assert!(h.client.texts_in(&chat()).iter().any(|t| t.contains("close this room")));
        assert!(!h.manager.is_active(&chat()));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(h.registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropout_runs_exactly_once() {
        let mut h = harness();
        let _ = h.manager.on_session_formed(spec(&["a", "b"], 60, 2));

        assert_eq!(
            h.manager.on_leave(&chat(), &who("a")),
            DepartureOutcome::Dropout { remaining: 1 }
        );
        assert_eq!(h.manager.on_leave(&chat(), &who("b")), DepartureOutcome::Ignored);

        let event = h.events.recv().await.unwrap();
        assert_matches!(event, RuntimeEvent::SessionClosed { reason: CloseReason::Dropout, .. });
        assert_eq!(h.client.adds(), vec![("lobby".into(), "b".into())]);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(h.events.try_recv().is_err());
        assert_eq!(
            h.client
                .texts_in(&chat())
                .iter()
                .filter(|t| t.contains("not enough participants"))
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn leave_above_minimum_keeps_countdown() {
        let mut h = harness();
        let _ = h.manager.on_session_formed(spec(&["a", "b", "c"], 30, 2));

        assert_eq!(
            h.manager.on_leave(&chat(), &who("a")),
            DepartureOutcome::Left { remaining: 2 }
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.client.texts_in(&chat()), vec!["user user-a left".to_owned()]);
        assert!(h.registry.contains("countdown:chat"));

        let event = h.events.recv().await.unwrap();
        assert_matches!(event, RuntimeEvent::SessionClosed { reason: CloseReason::Timeout, .. });
        assert_eq!(h.client.adds().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn last_leave_closes_silently() {
        let mut h = harness();
        let _ = h.manager.on_session_formed(spec(&["a"], 60, 0));

        assert_eq!(h.manager.on_leave(&chat(), &who("a")), DepartureOutcome::Empty);
        assert_matches!(
            h.events.recv().await.unwrap(),
            RuntimeEvent::SessionClosed { reason: CloseReason::Empty, .. }
        );
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(h.client.calls().is_empty());
        assert!(h.registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropout_near_deadline_closes_once() {
        let mut h = harness();
        let _ = h.manager.on_session_formed(spec(&["a", "b"], 5, 2));
        tokio::time::sleep(Duration::from_millis(4999)).await;
        let _ = h.manager.on_leave(&chat(), &who("a"));
        tokio::time::sleep(Duration::from_secs(60)).await;

        let mut closed = 0;
        while let Ok(event) = h.events.try_recv() {
            if matches!(event, RuntimeEvent::SessionClosed { .. }) {
                closed += 1;
            }
        }
        assert_eq!(closed, 1);
        assert_eq!(h.client.adds().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_members_and_sessions() {
        let h = harness();
        assert_eq!(h.manager.on_leave(&chat(), &who("a")), DepartureOutcome::NotTracked);
        let _ = h.manager.on_session_formed(spec(&["a", "b"], 60, 0));
        assert_eq!(h.manager.on_leave(&chat(), &who("z")), DepartureOutcome::NotMember);
    }

    #[tokio::test(start_paused = true)]
    async fn rejoin_is_readmitted_until_teardown() {
        let h = harness();
        let _ = h.manager.on_session_formed(spec(&["a", "b", "c"], 60, 2));
        let _ = h.manager.on_leave(&chat(), &who("c"));
        assert!(h.manager.on_join(&chat(), &"c".into()));
        assert_eq!(h.manager.participants(&chat()).len(), 3);

        let _ = h.manager.on_leave(&chat(), &who("a"));
        let _ = h.manager.on_leave(&chat(), &who("b"));
        assert!(!h.manager.on_join(&chat(), &"a".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn second_group_merges_into_running_session() {
        let h = harness();
        assert!(h.manager.on_session_formed(spec(&["a"], 60, 0)));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!h.manager.on_session_formed(spec(&["b"], 60, 0)));

        assert_eq!(h.manager.participants(&chat()), vec!["a".into(), "b".into()]);
        let left = h.manager.remaining(&chat()).unwrap();
        assert!(left <= Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn group_formed_during_grace_period_keeps_supervision() {
        let mut h = harness();
        assert!(h.manager.on_session_formed(spec(&["a"], 5, 0)));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(h.client.texts_in(&chat()).iter().any(|t| t.contains("close this room")));
        assert!(h.manager.on_session_formed(spec(&["x", "y"], 60, 0)));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(h.manager.is_active(&chat()));
        assert_eq!(h.manager.participants(&chat()), vec!["x".into(), "y".into()]);
        assert_eq!(h.client.adds(), vec![("redirect-1".into(), "a".into())]);
        assert!(h.registry.contains("countdown:chat"));
        assert!(h.events.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_matches!(
            h.events.try_recv(),
            Ok(RuntimeEvent::SessionClosed { reason: CloseReason::Timeout, .. })
        );
        let moved: Vec<ParticipantId> = h.client.adds().into_iter().map(|(_, p)| p).collect();
        assert_eq!(moved, vec!["a".into(), "x".into(), "y".into()]);
        assert!(!h.manager.is_active(&chat()));
    }

    #[tokio::test(start_paused = true)]
    async fn leave_during_dropout_grace_still_redirected_with_group() {
        let mut h = harness();
        let _ = h.manager.on_session_formed(spec(&["a", "b", "c"], 60, 3));
        let _ = h.manager.on_leave(&chat(), &who("a"));
        assert_eq!(h.manager.on_leave(&chat(), &who("b")), DepartureOutcome::Ignored);

        assert_matches!(
            h.events.recv().await.unwrap(),
            RuntimeEvent::SessionClosed { reason: CloseReason::Dropout, .. }
        );
        assert_eq!(
            h.client.adds(),
            vec![("lobby".into(), "b".into()), ("lobby".into(), "c".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn external_close_stops_countdown() {
        let mut h = harness();
        let _ = h.manager.on_session_formed(spec(&["a"], 30, 0));
        assert!(h.manager.close_session(&chat()));
        assert!(!h.manager.close_session(&chat()));

        assert_matches!(
            h.events.recv().await.unwrap(),
            RuntimeEvent::SessionClosed { reason: CloseReason::External, .. }
        );
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(h.client.calls().is_empty());
        assert_eq!(h.manager.session_count(), 0);
    }
}
