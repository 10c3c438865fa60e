//! Two-phase shutdown: close the listener, then drain every bot.
//!
//! Closing the listener lets in-flight requests finish while refusing new
//! ones. Draining cancels each bot's dispatcher and background tasks and waits
//! up to the bot timeout for them. `ConveneServer::serve` drains after its
//! listener closes; [`ShutdownCoordinator::graceful_shutdown`] drains again if
//! the serving task did not get that far.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bot::BotSupervisor;

/// Result of draining the bots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BotDrain {
    /// Bots that were stopped.
    pub stopped: usize,
    /// Bots whose tasks were still running when their timeout expired.
    pub unfinished: usize,
}

/// Coordinates shutdown of the listener and every bot.
pub struct ShutdownCoordinator {
    listener: CancellationToken,
    supervisor: Arc<BotSupervisor>,
    bot_timeout: Duration,
}

impl ShutdownCoordinator {
    /// Coordinator for `supervisor`'s bots, each given `bot_timeout` to stop.
    pub fn new(supervisor: Arc<BotSupervisor>, bot_timeout: Duration) -> Self {
        Self {
            listener: CancellationToken::new(),
            supervisor,
            bot_timeout,
        }
    }

    /// Stop accepting requests. Idempotent.
    pub fn close_listener(&self) {
        self.listener.cancel();
    }

    /// Resolves once [`close_listener`](Self::close_listener) has been called.
    pub async fn listener_closed(&self) {
        self.listener.cancelled().await;
    }

    /// Stop every registered bot.
    pub async fn drain_bots(&self) -> BotDrain {
        let drain = self.supervisor.shutdown(self.bot_timeout).await;
        if drain.unfinished > 0 {
            warn!(unfinished = drain.unfinished, "some bots did not finish their tasks in time");
        }
        drain
    }

    /// Close the listener and wait for the serving task, bounded by twice the
    /// bot timeout. Bots left running by an unfinished serving task are
    /// drained here. Returns `true` if the serving task ended in time.
    pub async fn graceful_shutdown(&self, server: JoinHandle<()>) -> bool {
        self.close_listener();
        let limit = self.bot_timeout * 2;
        info!(
            bots = self.supervisor.len(),
            timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            "waiting for server to stop"
        );

        let finished = tokio::time::timeout(limit, server).await.is_ok();
        if !finished {
            warn!("server did not stop after {limit:?}, draining bots directly");
            let _ = self.drain_bots().await;
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::test_support::{recording_supervisor, valid_setup};

    fn coordinator(bots: usize) -> ShutdownCoordinator {
        let (supervisor, _client) = recording_supervisor(8);
        for _ in 0..bots {
            let _ = supervisor.register(valid_setup()).unwrap();
        }
        ShutdownCoordinator::new(Arc::new(supervisor), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn listener_closed_resolves_after_close() {
        let coord = Arc::new(coordinator(0));
        let waiter = Arc::clone(&coord);
        let handle = tokio::spawn(async move { waiter.listener_closed().await });

        coord.close_listener();
        coord.close_listener();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn drain_stops_every_bot_once() {
        let coord = coordinator(3);
        assert_eq!(coord.drain_bots().await, BotDrain { stopped: 3, unfinished: 0 });
        assert_eq!(coord.drain_bots().await, BotDrain::default());
        assert!(coord.supervisor.is_empty());
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_server_task() {
        let coord = Arc::new(coordinator(1));
        let serving = Arc::clone(&coord);
        let server = tokio::spawn(async move {
            serving.listener_closed().await;
            let _ = serving.drain_bots().await;
        });

        assert!(coord.graceful_shutdown(server).await);
        assert!(coord.supervisor.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_server_task_still_drains_bots() {
        let coord = coordinator(2);
        let server = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        assert!(!coord.graceful_shutdown(server).await);
        assert!(coord.supervisor.is_empty());
    }
}
