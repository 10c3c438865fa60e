use std::sync::Arc;

use convene_client::Destination;
use convene_core::{ParticipantId, SessionId};
use convene_settings::render_notice;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::manager::Inner;
use crate::emitter::{CloseReason, RuntimeEvent};
use crate::errors::RuntimeError;

enum Tick {
    Quiet,
    Remaining(u128),
    Expired(Destination, Vec<ParticipantId>),
}

/// Tick until the deadline, announcing the remaining time every
/// `broadcast_every` ticks, then close the session.
pub(super) async fn countdown(inner: Arc<Inner>, session: SessionId, epoch: u64) {
    let period = inner.settings.tick_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let every = inner.settings.broadcast_every;
    let mut ticks: u64 = 0;

    loop {
        let _ = ticker.tick().await;
        ticks += 1;

        let tick = {
            let mut sessions = inner.sessions.lock();
            let Some(active) = sessions.get_mut(&session) else {
                return;
            };
            if active.epoch != epoch || active.teardown_in_progress {
                return;
            }
            let remaining = active.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                active.teardown_in_progress = true;
                Tick::Expired(active.timeout_destination.clone(), active.members())
            } else if every > 0 && ticks % every == 0 {
                Tick::Remaining(remaining.as_millis().div_ceil(1000))
            } else {
                Tick::Quiet
            }
        };

        match tick {
            Tick::Quiet => {}
            Tick::Remaining(seconds) => {
                debug!(session_id = %session, seconds, "countdown");
                let seconds = seconds.to_string();
                let text = render_notice(&inner.settings.remaining_notice, &[("seconds", seconds.as_str())]);
                inner.notify(&session, &text).await;
            }
            Tick::Expired(destination, present) => {
                info!(session_id = %session, "session time is up");
                let teardown = Teardown {
                    session: &session,
                    epoch,
                    present,
                    destination: &destination,
                    reason: CloseReason::Timeout,
                };
                let notice = inner.settings.closing_notice.clone();
                tear_down(&inner, teardown, &notice).await;
                return;
            }
        }
    }
}

/// A session whose teardown has been claimed.
///
/// Membership is frozen once `teardown_in_progress` is set, so `present` is
/// taken in the same critical section that claimed it. The session id may be
/// supervised again under a new epoch before the grace period ends.
pub(super) struct Teardown<'a> {
    pub(super) session: &'a SessionId,
    pub(super) epoch: u64,
    pub(super) present: Vec<ParticipantId>,
    pub(super) destination: &'a Destination,
    pub(super) reason: CloseReason,
}

/// Closing notice, grace period, redirect of the frozen membership, removal.
pub(super) async fn tear_down(inner: &Inner, teardown: Teardown<'_>, notice: &str) {
    let Teardown {
        session,
        epoch,
        present,
        destination,
        reason,
    } = teardown;

    inner.notify(session, notice).await;
    tokio::time::sleep(inner.settings.grace_period()).await;

    if !present.is_empty() {
        match inner.redirector.resolve(destination).await {
            Ok(to) => {
                let moves = present.into_iter().map(|p| (p, session.clone()));
                let report = inner.redirector.redirect_all(moves, &to).await;
                if !report.is_complete() {
                    warn!(session_id = %session, failed = report.failed.len(), "some participants were not redirected");
                }
            }
            Err(e) => {
                let e = RuntimeError::from(e);
                error!(session_id = %session, error = %e, category = e.category(), "closing destination unavailable");
            }
        }
    }

    let removed = {
        let mut sessions = inner.sessions.lock();
        if sessions.get(session).is_some_and(|active| active.epoch == epoch) {
            sessions.remove(session).is_some()
        } else {
            false
        }
    };
    if !removed {
        debug!(session_id = %session, epoch, "session re-formed during teardown, new supervision kept");
        return;
    }
    info!(session_id = %session, reason = ?reason, "session closed");
    let _ = inner.emitter.emit(RuntimeEvent::SessionClosed {
        session_id: session.clone(),
        reason,
    });
}
