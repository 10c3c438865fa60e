//! Bot instances and their supervisor.

mod instance;
mod supervisor;

pub use instance::BotHandle;
pub use supervisor::{BotSupervisor, ClientFactory, http_client_factory};

#[cfg(test)]
pub(crate) use supervisor::tests as test_support;
