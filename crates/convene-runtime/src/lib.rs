//! # convene-runtime
//!
//! The three coordinating components and the plumbing they share.
//!
//! - [`MatchmakingCoordinator`]: waiting pools, quorum hand-off, admission timeout
//! - [`SessionLifecycleManager`]: countdown, timeout redirect, dropout teardown
//! - [`ReplyScheduler`]: at most one in-flight reply per session, newest input wins
//! - [`TaskRegistry`]: keyed, cancellable background tasks
//! - [`EventEmitter`]: broadcast of [`RuntimeEvent`]s between components
//!
//! ## Concurrency
//!
//! Handlers are synchronous. Each performs its state transition inside one
//! short `parking_lot` critical section and hands network calls, grace periods
//! and generation to tasks spawned through the registry. Watchdogs take the
//! same lock for every state-touching tick, so hand-off vs. admission timeout
//! and dropout vs. countdown timeout are decided by whichever critical section
//! runs first.

#![deny(unsafe_code)]

pub mod emitter;
pub mod errors;
pub mod lifecycle;
pub mod matchmaking;
pub mod provision;
pub mod registry;
pub mod reply;

pub use emitter::{CloseReason, EventEmitter, RuntimeEvent};
pub use errors::RuntimeError;
pub use lifecycle::{DepartureOutcome, SessionLifecycleManager, SessionSpec};
pub use matchmaking::{JoinOutcome, LeaveOutcome, MatchmakingCoordinator, TaskConfig, TaskTemplate};
pub use provision::{FixedSession, FreshSession, SessionProvisioner};
pub use registry::TaskRegistry;
pub use reply::{MessageOutcome, ReplyScheduler, TypingPacing};
