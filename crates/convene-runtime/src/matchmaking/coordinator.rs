use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use convene_client::{Destination, Redirector};
use convene_core::{BroadcastOptions, ParticipantId, SessionId, TaskId};
use convene_settings::{MatchmakingSettings, render_notice};
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::{TaskConfig, TaskTemplate, handoff, watchdog};
use crate::emitter::EventEmitter;
use crate::provision::SessionProvisioner;
use crate::registry::TaskRegistry;

/// Result of [`MatchmakingCoordinator::on_join`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Recorded; the pool still lacks `missing` members.
    Waiting {
        /// Members still needed.
        missing: usize,
    },
    /// Quorum reached; these members are being handed off, in redirect order.
    HandOff {
        /// The group.
        participants: Vec<ParticipantId>,
    },
    /// The task already timed out; the participant is sent to its timeout destination.
    LateArrival,
    /// No configuration and no template for the task.
    UnknownTask,
}

/// Result of [`MatchmakingCoordinator::on_leave`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Entry removed; the pool now lacks `missing` members.
    Removed {
        /// Members still needed.
        missing: usize,
    },
    /// The participant was not waiting for the task.
    NotWaiting,
}

pub(super) struct WaitingPool {
    pub(super) config: TaskConfig,
    pub(super) epoch: u64,
    pub(super) entries: BTreeMap<ParticipantId, SessionId>,
    watchdog_started: bool,
}

impl WaitingPool {
    pub(super) fn missing(&self) -> usize {
        self.config.quorum.saturating_sub(self.entries.len())
    }
}

/// Terminal marker of a timed-out task. The destination is resolved once and
/// shared by the timeout redirect and every late arrival.
#[derive(Clone)]
pub(super) struct TimedOut {
    destination: Destination,
    resolved: Arc<OnceCell<SessionId>>,
}

impl TimedOut {
    pub(super) fn new(destination: Destination) -> Self {
        Self {
            destination,
            resolved: Arc::new(OnceCell::new()),
        }
    }

    pub(super) async fn resolve(&self, redirector: &Redirector) -> convene_client::ClientResult<SessionId> {
        self.resolved
            .get_or_try_init(|| redirector.resolve(&self.destination))
            .await
            .cloned()
    }
}

#[derive(Default)]
pub(super) struct PoolState {
    configs: HashMap<TaskId, TaskConfig>,
    pub(super) pools: HashMap<TaskId, WaitingPool>,
    pub(super) timed_out: HashMap<TaskId, TimedOut>,
}

pub(super) struct Inner {
    pub(super) state: Mutex<PoolState>,
    template: Option<TaskTemplate>,
    pub(super) settings: MatchmakingSettings,
    pub(super) redirector: Redirector,
    pub(super) provisioner: Arc<dyn SessionProvisioner>,
    pub(super) registry: Arc<TaskRegistry>,
    pub(super) emitter: Arc<EventEmitter>,
    next_epoch: AtomicU64,
}

impl Inner {
    /// Typing indicator for the configured duration, then the notice.
    pub(super) async fn announce(&self, session: &SessionId, text: &str, options: BroadcastOptions) {
        let client = self.redirector.client();
        let typing = self.settings.notice_typing();
        if !typing.is_zero() {
            if let Err(e) = client.set_composing(session, true).await {
                debug!(session_id = %session, error = %e, "typing indicator failed");
            }
            tokio::time::sleep(typing).await;
            if let Err(e) = client.set_composing(session, false).await {
                debug!(session_id = %session, error = %e, "typing indicator failed");
            }
        }
        if let Err(e) = client.broadcast(session, text, options).await {
            warn!(session_id = %session, error = %e, "notice not delivered");
        }
    }
}

enum Effect {
    None,
    Notice { missing: usize },
    HandOff(WaitingPool),
    Late(TimedOut),
}

/// Owns every waiting pool of one bot.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MatchmakingCoordinator {
    inner: Arc<Inner>,
}

impl MatchmakingCoordinator {
    /// Create a coordinator. Tasks without an explicit [`TaskConfig`] are
    /// created from `template` on first join; without a template they are
    /// rejected.
    pub fn new(
        settings: MatchmakingSettings,
        template: Option<TaskTemplate>,
        redirector: Redirector,
        provisioner: Arc<dyn SessionProvisioner>,
        registry: Arc<TaskRegistry>,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(PoolState::default()),
                template,
                settings,
                redirector,
                provisioner,
                registry,
                emitter,
                next_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Register explicit parameters for a task. Applies to pools created
    /// after this call.
    pub fn configure_task(&self, config: TaskConfig) {
        let _ = self.inner.state.lock().configs.insert(config.task_id.clone(), config);
    }

    /// Record `participant` as waiting for `task` in `room`.
    #[instrument(skip_all, fields(task_id = %task, participant_id = %participant))]
    pub fn on_join(&self, participant: &ParticipantId, task: &TaskId, room: &SessionId) -> JoinOutcome {
        let mut watchdog_deadline = None;
        let (outcome, effect) = {
            let mut state = self.inner.state.lock();

            if let Some(marker) = state.timed_out.get(task) {
                (JoinOutcome::LateArrival, Effect::Late(marker.clone()))
            } else {
                if !state.pools.contains_key(task) {
                    let Some(config) = state
                        .configs
                        .get(task)
                        .cloned()
                        .or_else(|| self.inner.template.as_ref().map(|t| t.for_task(task.clone())))
                    else {
                        return JoinOutcome::UnknownTask;
                    };
                    let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
                    let _ = state.pools.insert(
                        task.clone(),
                        WaitingPool {
                            config,
                            epoch,
                            entries: BTreeMap::new(),
                            watchdog_started: false,
                        },
                    );
                }

                let (missing, epoch, timeout) = match state.pools.get_mut(task) {
                    Some(pool) => {
                        let _ = pool.entries.insert(participant.clone(), room.clone());
                        let first = !pool.watchdog_started;
                        pool.watchdog_started = true;
                        (pool.missing(), first.then_some(pool.epoch), pool.config.timeout)
                    }
                    None => return JoinOutcome::UnknownTask,
                };

                if missing > 0 {
                    if let Some(epoch) = epoch {
                        watchdog_deadline = Some((epoch, Instant::now() + timeout));
                    }
                    (JoinOutcome::Waiting { missing }, Effect::Notice { missing })
                } else {
                    match state.pools.remove(task) {
                        Some(pool) => (
                            JoinOutcome::HandOff {
                                participants: pool.entries.keys().cloned().collect(),
                            },
                            Effect::HandOff(pool),
                        ),
                        None => (JoinOutcome::UnknownTask, Effect::None),
                    }
                }
            }
        };

        if let Some((epoch, deadline)) = watchdog_deadline {
            let inner = Arc::clone(&self.inner);
            let task = task.clone();
            let _ = self.inner.registry.spawn(
                format!("admission:{task}"),
                watchdog::admission_watchdog(inner, task, epoch, deadline),
            );
        }

        match effect {
            Effect::None => {}
            Effect::Notice { missing } => {
                info!(missing, "participant waiting");
                let inner = Arc::clone(&self.inner);
                let room = room.clone();
                let participant = participant.clone();
                let missing = missing.to_string();
                let text = render_notice(&self.inner.settings.waiting_notice, &[("missing", missing.as_str())]);
                let _ = self.inner.registry.spawn(format!("notice:{task}:{participant}"), async move {
                    inner.announce(&room, &text, BroadcastOptions::to(participant)).await;
                });
            }
            Effect::HandOff(pool) => {
                info!(members = pool.entries.len(), "quorum reached");
                let _ = self.inner.registry.cancel(&format!("admission:{task}"));
                let inner = Arc::clone(&self.inner);
                let _ = self
                    .inner
                    .registry
                    .spawn(format!("handoff:{task}"), handoff::hand_off(inner, pool));
            }
            Effect::Late(marker) => {
                info!("join after admission timeout, redirecting");
                let inner = Arc::clone(&self.inner);
                let _ = self.inner.registry.spawn(
                    format!("late:{task}:{participant}"),
                    watchdog::redirect_late(inner, participant.clone(), room.clone(), marker),
                );
            }
        }

        outcome
    }

    /// Drop `participant` from `task`'s pool. Idempotent.
    #[instrument(skip_all, fields(task_id = %task, participant_id = %participant))]
    pub fn on_leave(&self, participant: &ParticipantId, task: &TaskId) -> LeaveOutcome {
        let mut state = self.inner.state.lock();
        let Some(pool) = state.pools.get_mut(task) else {
            return LeaveOutcome::NotWaiting;
        };
        if pool.entries.remove(participant).is_none() {
            return LeaveOutcome::NotWaiting;
        }
        let missing = pool.missing();
        debug!(missing, "participant left waiting pool");
        LeaveOutcome::Removed { missing }
    }

    /// Members currently waiting for `task`, ascending.
    pub fn waiting(&self, task: &TaskId) -> Vec<ParticipantId> {
        self.inner
            .state
            .lock()
            .pools
            .get(task)
            .map(|p| p.entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `task` missed its admission deadline.
    pub fn is_timed_out(&self, task: &TaskId) -> bool {
        self.inner.state.lock().timed_out.contains_key(task)
    }

    /// Number of open pools.
    pub fn pool_count(&self) -> usize {
        self.inner.state.lock().pools.len()
    }
}
