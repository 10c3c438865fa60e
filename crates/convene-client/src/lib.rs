//! # convene-client
//!
//! Everything convene says to the chat platform goes through here.
//!
//! - [`SessionClient`]: the outbound command contract (membership, notices,
//!   typing indicator, session provisioning, task lookup)
//! - [`HttpSessionClient`]: REST implementation over `reqwest`
//! - [`Redirector`]: remove-then-add moves of participants between sessions
//! - [`testing::RecordingClient`]: in-memory implementation that records calls

#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod http;
pub mod redirect;
pub mod testing;

pub use client::{SessionClient, SharedClient};
pub use error::{ClientError, ClientResult};
pub use http::HttpSessionClient;
pub use redirect::{Destination, RedirectReport, Redirector};
