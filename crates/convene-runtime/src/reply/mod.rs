//! Generated replies with preemption.
//!
//! At most one reply is in flight per session. A new participant message
//! cancels the pending one before it can post anything, so a burst of
//! messages yields a single reply to the latest.

mod pacing;
mod scheduler;

pub use pacing::TypingPacing;
pub use scheduler::{MessageOutcome, ReplyScheduler};
