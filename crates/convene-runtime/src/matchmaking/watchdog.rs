use std::sync::Arc;

use convene_client::RedirectReport;
use convene_core::{BroadcastOptions, ParticipantId, SessionId, TaskId};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use super::coordinator::{Inner, TimedOut, WaitingPool};
use crate::emitter::RuntimeEvent;
use crate::errors::RuntimeError;

/// Poll the pool of `task` until it is handed off, replaced, or its deadline
/// passes. Claiming the timeout happens under the state lock, the same one
/// `on_join` takes to detect quorum.
pub(super) async fn admission_watchdog(inner: Arc<Inner>, task: TaskId, epoch: u64, deadline: Instant) {
    let mut ticker = tokio::time::interval(inner.settings.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let _ = ticker.tick().await;
        let claimed = {
            let mut state = inner.state.lock();
            let live = state
                .pools
                .get(&task)
                .is_some_and(|pool| pool.epoch == epoch && pool.missing() > 0);
            if !live {
                return;
            }
            if Instant::now() < deadline {
                None
            } else {
                let pool = state.pools.remove(&task);
                pool.map(|pool| {
                    let marker = TimedOut::new(pool.config.timeout_destination.clone());
                    let _ = state.timed_out.insert(task.clone(), marker.clone());
                    (pool, marker)
                })
            }
        };

        if let Some((pool, marker)) = claimed {
            expire(&inner, pool, marker).await;
            return;
        }
    }
}

async fn expire(inner: &Inner, pool: WaitingPool, marker: TimedOut) {
    let WaitingPool { config, entries, .. } = pool;
    warn!(task_id = %config.task_id, waiting = entries.len(), "admission deadline passed");

    inner
        .announce(
            &config.source_session,
            &inner.settings.timeout_notice,
            BroadcastOptions::everyone(),
        )
        .await;
    tokio::time::sleep(inner.settings.redirect_delay()).await;

    let (destination, report) = if entries.is_empty() {
        (None, RedirectReport::default())
    } else {
        match marker.resolve(&inner.redirector).await {
            Ok(dest) => {
                let report = inner.redirector.redirect_all(entries, &dest).await;
                (Some(dest), report)
            }
            Err(e) => {
                let e = RuntimeError::from(e);
                error!(task_id = %config.task_id, error = %e, category = e.category(), "timeout destination unavailable");
                let failed = entries.into_keys().collect();
                (None, RedirectReport { moved: Vec::new(), failed })
            }
        }
    };

    info!(
        task_id = %config.task_id,
        moved = report.moved.len(),
        failed = report.failed.len(),
        "waiting pool timed out"
    );
    let _ = inner.emitter.emit(RuntimeEvent::TaskTimedOut {
        task_id: config.task_id,
        destination,
        participants: report.moved,
        failed: report.failed,
    });
}

/// Send a participant who joined a timed-out task to its timeout destination.
pub(super) async fn redirect_late(inner: Arc<Inner>, participant: ParticipantId, room: SessionId, marker: TimedOut) {
    match marker.resolve(&inner.redirector).await {
        Ok(dest) => {
            if let Err(e) = inner.redirector.redirect(&participant, &room, &dest).await {
                warn!(participant_id = %participant, error = %e, "late arrival not redirected");
            }
        }
        Err(e) => warn!(participant_id = %participant, error = %e, "timeout destination unavailable"),
    }
}
