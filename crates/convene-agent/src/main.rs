//! # convene
//!
//! Server binary: loads settings, installs logging, picks the reply
//! generator, and serves the bot registration API until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use convene_core::LogFormat;
use convene_core::logging::init_subscriber;
use convene_llm::create_generator;
use convene_server::{BotSupervisor, ConveneServer, ServerConfig, http_client_factory};
use convene_settings::{ConveneSettings, GeneratorKind, load_settings_from_path, settings_path};

/// convene bot server.
#[derive(Parser, Debug)]
#[command(name = "convene", version, about = "Waiting-room matchmaking and chat session supervision bots")]
struct Cli {
    /// Settings file (defaults to `~/.convene/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter, e.g. `info` or `convene_runtime=debug` (`RUST_LOG` wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format: `compact` or `json`.
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Reply generator: `echo` or `chatCompletions`.
    #[arg(long)]
    generator: Option<GeneratorKind>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut ConveneSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
        if let Some(kind) = self.generator {
            settings.generator.kind = kind;
        }
    }

    fn log_filter(&self, settings: &ConveneSettings) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| settings.logging.level.as_filter_str().to_owned())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let path = args.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    args.apply(&mut settings);

    init_subscriber(&args.log_filter(&settings), settings.logging.format);
    tracing::info!(version = convene_core::constants::VERSION, settings = %path.display(), "starting convene");

    let generator = create_generator(&settings.generator).context("Failed to create reply generator")?;
    tracing::info!(generator = generator.name(), "reply generator ready");

    let config = ServerConfig::from(&settings.server);
    let client_factory = http_client_factory(settings.platform.clone());
    let supervisor = BotSupervisor::new(Arc::new(settings), generator, client_factory);
    let server = Arc::new(ConveneServer::new(config, supervisor));

    let listener = server.bind().await.context("Failed to bind server")?;
    let running = Arc::clone(&server);
    let handle = tokio::spawn(async move {
        if let Err(e) = running.serve(listener).await {
            tracing::error!(error = %e, category = e.category(), "server stopped with error");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let clean = server.shutdown().graceful_shutdown(handle).await;

    tracing::info!(clean, "Shutdown complete");
    Ok(())
}
