use std::sync::Arc;

use convene_core::BroadcastOptions;
use tracing::{error, info};

use super::coordinator::{Inner, WaitingPool};
use crate::emitter::RuntimeEvent;
use crate::errors::RuntimeError;

/// Announce, provision, and move a detached pool. The pool left the state
/// map when quorum was reached, so nothing here can race a timeout.
pub(super) async fn hand_off(inner: Arc<Inner>, pool: WaitingPool) {
    let task_id = pool.config.task_id.clone();
    if let Err(e) = try_hand_off(&inner, pool).await {
        error!(
            task_id = %task_id,
            error = %e,
            category = e.category(),
            recoverable = e.is_recoverable(),
            "hand-off abandoned"
        );
    }
}

async fn try_hand_off(inner: &Inner, pool: WaitingPool) -> Result<(), RuntimeError> {
    let WaitingPool { config, entries, .. } = pool;

    inner
        .announce(
            &config.source_session,
            &inner.settings.complete_notice,
            BroadcastOptions::everyone(),
        )
        .await;
    tokio::time::sleep(inner.settings.redirect_delay()).await;

    let destination = inner
        .provisioner
        .provision(&config.task_id)
        .await
        .map_err(|source| RuntimeError::Provision {
            task_id: config.task_id.clone(),
            source,
        })?;

    let report = inner.redirector.redirect_all(entries, &destination).await;
    info!(
        task_id = %config.task_id,
        destination = %destination,
        moved = report.moved.len(),
        failed = report.failed.len(),
        "group handed off"
    );
    let _ = inner.emitter.emit(RuntimeEvent::GroupHandedOff {
        task_id: config.task_id,
        source_session: config.source_session,
        destination,
        participants: report.moved,
        failed: report.failed,
    });
    Ok(())
}
