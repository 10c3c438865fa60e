//! # convene-server
//!
//! HTTP front door and per-bot plumbing.
//!
//! - `POST /register` validates a [`BotSetup`](convene_settings::BotSetup) and
//!   starts a bot instance: its components, a dispatcher task draining an mpsc
//!   queue of inbound events, and a task forwarding runtime events between
//!   components
//! - `POST /bots/{id}/events` enqueues one inbound event
//! - `DELETE /bots/{id}` cancels everything the bot runs
//! - Two-phase graceful shutdown: close the listener, then drain bots

#![deny(unsafe_code)]

pub mod bot;
pub mod config;
pub mod error;
pub mod health;
pub mod routes;
pub mod server;
pub mod shutdown;

pub use bot::{BotSupervisor, ClientFactory, http_client_factory};
pub use config::ServerConfig;
pub use error::ServerError;
pub use server::ConveneServer;
pub use shutdown::{BotDrain, ShutdownCoordinator};
