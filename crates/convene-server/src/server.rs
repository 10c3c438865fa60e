//! `ConveneServer`: the HTTP listener and its bots.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::bot::BotSupervisor;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::routes::{self, AppState};
use crate::shutdown::ShutdownCoordinator;

/// The convene server.
pub struct ConveneServer {
    config: ServerConfig,
    supervisor: Arc<BotSupervisor>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl ConveneServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, supervisor: BotSupervisor) -> Self {
        let supervisor = Arc::new(supervisor);
        let shutdown = ShutdownCoordinator::new(Arc::clone(&supervisor), config.shutdown_timeout);
        Self {
            config,
            supervisor,
            shutdown: Arc::new(shutdown),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        routes::router(AppState {
            supervisor: Arc::clone(&self.supervisor),
            start_time: self.start_time,
        })
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        Ok(TcpListener::bind(self.config.bind_addr()).await?)
    }

    /// Serve on `listener` until the shutdown coordinator closes it, then
    /// drain every bot.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        info!(%addr, "listening");

        let shutdown = Arc::clone(&self.shutdown);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.listener_closed().await })
            .await?;

        let drain = self.shutdown.drain_bots().await;
        info!(stopped = drain.stopped, "listener closed, bots stopped");
        Ok(())
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the bot supervisor.
    pub fn supervisor(&self) -> &Arc<BotSupervisor> {
        &self.supervisor
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
