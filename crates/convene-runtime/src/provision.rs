//! Where a handed-off group goes.

use async_trait::async_trait;
use convene_client::{ClientResult, SharedClient};
use convene_core::{SessionId, TaskId};

/// Supplies the destination session for a hand-off.
#[async_trait]
pub trait SessionProvisioner: Send + Sync {
    /// Destination for the group of `task`.
    async fn provision(&self, task: &TaskId) -> ClientResult<SessionId>;
}

/// Every group goes to the same pre-created session.
#[derive(Clone, Debug)]
pub struct FixedSession(pub SessionId);

#[async_trait]
impl SessionProvisioner for FixedSession {
    async fn provision(&self, _task: &TaskId) -> ClientResult<SessionId> {
        Ok(self.0.clone())
    }
}

/// Every group gets a session created for it on the platform.
#[derive(Clone)]
pub struct FreshSession(pub SharedClient);

#[async_trait]
impl SessionProvisioner for FreshSession {
    async fn provision(&self, _task: &TaskId) -> ClientResult<SessionId> {
        self.0.create_session().await
    }
}
