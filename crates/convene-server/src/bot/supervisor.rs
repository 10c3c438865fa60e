//! Registry of running bots.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use convene_client::{ClientResult, HttpSessionClient, SharedClient};
use convene_core::{BotId, InboundEvent};
use convene_llm::SharedGenerator;
use convene_settings::{BotSetup, ConveneSettings, PlatformSettings};
use dashmap::DashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::BotHandle;
use crate::error::ServerError;
use crate::shutdown::BotDrain;

/// Builds the platform client for a bot from its registration.
pub type ClientFactory = Arc<dyn Fn(&BotSetup) -> ClientResult<SharedClient> + Send + Sync>;

/// Factory producing [`HttpSessionClient`]s authenticated with each bot's token.
pub fn http_client_factory(platform: PlatformSettings) -> ClientFactory {
    Arc::new(move |setup: &BotSetup| {
        let client: SharedClient = Arc::new(HttpSessionClient::new(&platform, setup.token.clone())?);
        Ok(client)
    })
}

/// Owns every bot instance of the process.
pub struct BotSupervisor {
    settings: Arc<ConveneSettings>,
    generator: SharedGenerator,
    client_factory: ClientFactory,
    bots: DashMap<BotId, BotHandle>,
    slots: AtomicUsize,
    root: CancellationToken,
}

impl BotSupervisor {
    /// Create a supervisor. Bots share `generator`.
    pub fn new(settings: Arc<ConveneSettings>, generator: SharedGenerator, client_factory: ClientFactory) -> Self {
        Self {
            settings,
            generator,
            client_factory,
            bots: DashMap::new(),
            slots: AtomicUsize::new(0),
            root: CancellationToken::new(),
        }
    }

    /// Validate `setup` and start a bot for it.
    pub fn register(&self, setup: BotSetup) -> Result<BotId, ServerError> {
        setup.validate()?;
        let limit = self.settings.server.max_bots;
        if !self.reserve_slot(limit) {
            return Err(ServerError::TooManyBots(limit));
        }

        let client = match (self.client_factory)(&setup) {
            Ok(client) => client,
            Err(e) => {
                self.release_slot();
                return Err(e.into());
            }
        };
        let id = BotId::new();
        let handle = BotHandle::start(
            id.clone(),
            setup,
            &self.settings,
            client,
            Arc::clone(&self.generator),
            &self.root,
        );
        let _ = self.bots.insert(id.clone(), handle);
        info!(bot_id = %id, bots = self.bots.len(), "bot registered");
        Ok(id)
    }

    /// Queue `event` for bot `id`.
    pub fn dispatch(&self, id: &BotId, event: InboundEvent) -> Result<(), ServerError> {
        let handle = self.bots.get(id).ok_or_else(|| ServerError::BotNotFound(id.clone()))?;
        handle.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => {
                warn!(bot_id = %id, "event queue full, dropping event");
                ServerError::QueueFull(id.clone())
            }
            TrySendError::Closed(_) => ServerError::QueueClosed(id.clone()),
        })
    }

    /// Stop and forget bot `id`. Returns `false` if it was not registered.
    pub async fn remove(&self, id: &BotId) -> bool {
        let Some((_, handle)) = self.bots.remove(id) else {
            return false;
        };
        self.release_slot();
        let _ = handle.stop(self.settings.server.shutdown_timeout()).await;
        true
    }

    /// Stop every bot, waiting up to `timeout` for each.
    pub async fn shutdown(&self, timeout: Duration) -> BotDrain {
        self.root.cancel();
        let ids: Vec<BotId> = self.bots.iter().map(|e| e.key().clone()).collect();
        let handles: Vec<BotHandle> = ids
            .iter()
            .filter_map(|id| self.bots.remove(id).map(|(_, h)| h))
            .collect();
        for _ in &handles {
            self.release_slot();
        }
        info!(bots = handles.len(), "stopping bots");
        let finished = futures::future::join_all(handles.iter().map(|h| h.stop(timeout))).await;
        BotDrain {
            stopped: finished.len(),
            unfinished: finished.iter().filter(|done| !**done).count(),
        }
    }

    /// Claim a bot slot if fewer than `limit` are taken.
    fn reserve_slot(&self, limit: usize) -> bool {
        self.slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |taken| (taken < limit).then_some(taken + 1))
            .is_ok()
    }

    fn release_slot(&self) {
        let _ = self.slots.fetch_sub(1, Ordering::AcqRel);
    }

    /// Whether bot `id` is registered.
    pub fn contains(&self, id: &BotId) -> bool {
        self.bots.contains_key(id)
    }

    /// Number of registered bots.
    pub fn len(&self) -> usize {
        self.bots.len()
    }

    /// Whether no bot is registered.
    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use assert_matches::assert_matches;
    use convene_client::testing::RecordingClient;
    use convene_core::{Participant, PresenceEvent};
    use convene_llm::EchoGenerator;

    use super::*;

    pub(crate) fn recording_supervisor(max_bots: usize) -> (BotSupervisor, Arc<RecordingClient>) {
        let client = Arc::new(RecordingClient::new());
        let shared = Arc::clone(&client);
        let factory: ClientFactory = Arc::new(move |_setup: &BotSetup| {
            let client: SharedClient = shared.clone();
            Ok(client)
        });
        let mut settings = ConveneSettings::default();
        settings.server.max_bots = max_bots;
        let supervisor = BotSupervisor::new(Arc::new(settings), Arc::new(EchoGenerator), factory);
        (supervisor, client)
    }

    pub(crate) fn valid_setup() -> BotSetup {
        serde_json::from_value(serde_json::json!({
            "token": "tok",
            "user": 1,
            "waitingSession": "wait",
            "taskId": "t1",
            "waitingTimeoutSecs": 60,
            "waitingTimeoutUrl": "https://survey.example/timeout",
            "chatTimeoutSecs": 600,
            "chatTimeoutUrl": "https://survey.example/done"
        }))
        .unwrap()
    }

    fn join(id: &str) -> InboundEvent {
        InboundEvent::Presence(PresenceEvent::join(Participant::new(id, "someone"), "wait"))
    }

    #[tokio::test]
    async fn register_and_dispatch() {
        let (supervisor, _client) = recording_supervisor(4);
        let id = supervisor.register(valid_setup()).unwrap();
        assert!(supervisor.contains(&id));
        supervisor.dispatch(&id, join("5")).unwrap();
    }

    #[tokio::test]
    async fn invalid_setup_rejected() {
        let (supervisor, _client) = recording_supervisor(4);
        let mut setup = valid_setup();
        setup.quorum = 0;
        assert_matches!(supervisor.register(setup), Err(ServerError::Setup(_)));
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn bot_limit_enforced() {
        let (supervisor, _client) = recording_supervisor(1);
        let _ = supervisor.register(valid_setup()).unwrap();
        assert_matches!(supervisor.register(valid_setup()), Err(ServerError::TooManyBots(1)));
    }

    #[tokio::test]
    async fn unknown_bot_not_found() {
        let (supervisor, _client) = recording_supervisor(4);
        assert_matches!(
            supervisor.dispatch(&"nope".into(), join("5")),
            Err(ServerError::BotNotFound(_))
        );
    }

    #[tokio::test]
    async fn removed_bot_is_gone() {
        let (supervisor, _client) = recording_supervisor(4);
        let id = supervisor.register(valid_setup()).unwrap();
        assert!(supervisor.remove(&id).await);
        assert!(!supervisor.remove(&id).await);
        assert_matches!(supervisor.dispatch(&id, join("5")), Err(ServerError::BotNotFound(_)));
    }

    #[tokio::test]
    async fn shutdown_stops_all_bots() {
        let (supervisor, _client) = recording_supervisor(4);
        let _ = supervisor.register(valid_setup()).unwrap();
        let _ = supervisor.register(valid_setup()).unwrap();
        let drain = supervisor.shutdown(Duration::from_secs(1)).await;
        assert_eq!(drain.stopped, 2);
        assert_eq!(drain.unfinished, 0);
        assert!(supervisor.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_respect_limit() {
        let (supervisor, _client) = recording_supervisor(3);
        let supervisor = Arc::new(supervisor);
        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let supervisor = Arc::clone(&supervisor);
                tokio::spawn(async move { supervisor.register(valid_setup()) })
            })
            .collect();

        let mut accepted = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => assert_matches!(e, ServerError::TooManyBots(3)),
            }
        }
        assert_eq!(accepted, 3);
        assert_eq!(supervisor.len(), 3);
    }

    #[tokio::test]
    async fn removal_frees_a_slot() {
        let (supervisor, _client) = recording_supervisor(1);
        let id = supervisor.register(valid_setup()).unwrap();
        assert_matches!(supervisor.register(valid_setup()), Err(ServerError::TooManyBots(1)));
        assert!(supervisor.remove(&id).await);
        assert!(supervisor.register(valid_setup()).is_ok());
    }
}
