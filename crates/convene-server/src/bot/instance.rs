//! One running bot: its components, dispatcher, and event forwarding.

use std::sync::Arc;
use std::time::Duration;

use convene_client::{ClientResult, Destination, Redirector, SharedClient};
use convene_core::{BotId, InboundEvent, Participant, ParticipantId, PresenceEvent, PresenceKind, SessionId, TaskId};
use convene_llm::SharedGenerator;
use convene_runtime::{
    EventEmitter, FixedSession, FreshSession, MatchmakingCoordinator, ReplyScheduler, RuntimeEvent,
    SessionLifecycleManager, SessionProvisioner, SessionSpec, TaskRegistry, TaskTemplate,
};
use convene_settings::{BotRole, BotSetup, ConveneSettings};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Handle to a running bot, held by the supervisor.
pub struct BotHandle {
    id: BotId,
    tx: mpsc::Sender<InboundEvent>,
    registry: Arc<TaskRegistry>,
}

impl BotHandle {
    /// Build the bot's components from `setup` and start its dispatcher.
    pub fn start(
        id: BotId,
        setup: BotSetup,
        settings: &ConveneSettings,
        client: SharedClient,
        generator: SharedGenerator,
        parent: &CancellationToken,
    ) -> Self {
        let registry = Arc::new(TaskRegistry::with_root(parent.child_token()));
        let emitter = Arc::new(EventEmitter::new());
        let redirector = match settings.redirect.arrival_notice() {
            Some(text) => Redirector::new(Arc::clone(&client)).with_arrival_notice(text),
            None => Redirector::new(Arc::clone(&client)),
        };

        let matchmaking = setup.has_role(BotRole::Matchmaking).then(|| {
            let provisioner: Arc<dyn SessionProvisioner> = match &setup.chat_session {
                Some(session) => Arc::new(FixedSession(session.clone())),
                None => Arc::new(FreshSession(Arc::clone(&client))),
            };
            let template = setup.waiting_session.clone().map(|source_session| TaskTemplate {
                quorum: setup.quorum,
                source_session,
                timeout: setup.waiting_timeout(),
                timeout_destination: Destination::Url(setup.waiting_timeout_url.clone().unwrap_or_default()),
            });
            MatchmakingCoordinator::new(
                settings.matchmaking.clone(),
                template,
                redirector.clone(),
                provisioner,
                Arc::clone(&registry),
                Arc::clone(&emitter),
            )
        });

        let lifecycle = setup.has_role(BotRole::Lifecycle).then(|| {
            SessionLifecycleManager::new(
                settings.lifecycle.clone(),
                redirector.clone(),
                Arc::clone(&registry),
                Arc::clone(&emitter),
            )
        });

        let reply = setup.has_role(BotRole::Reply).then(|| {
            ReplyScheduler::new(
                Participant::new(setup.user.clone(), setup.name.clone()),
                setup.excluded_senders.clone(),
                &settings.reply,
                generator,
                Arc::clone(&client),
                Arc::clone(&registry),
                Arc::clone(&emitter),
            )
        });

        let bot = Arc::new(Bot {
            id: id.clone(),
            setup,
            client,
            matchmaking,
            lifecycle,
            reply,
            registry: Arc::clone(&registry),
        });

        let (tx, rx) = mpsc::channel(settings.server.event_queue_capacity.max(1));
        let _ = registry.spawn("events", Arc::clone(&bot).forward_events(emitter.subscribe()));
        let _ = registry.spawn("dispatcher", bot.dispatch(rx));

        info!(bot_id = %id, "bot started");
        Self { id, tx, registry }
    }

    /// The bot's id.
    pub fn id(&self) -> &BotId {
        &self.id
    }

    /// Queue an event without waiting.
    pub fn try_send(&self, event: InboundEvent) -> Result<(), mpsc::error::TrySendError<InboundEvent>> {
        self.tx.try_send(event)
    }

    /// Keys of the bot's running background tasks.
    pub fn running_tasks(&self) -> Vec<String> {
        self.registry.keys()
    }

    /// Cancel everything the bot runs and wait up to `timeout`.
    pub async fn stop(&self, timeout: Duration) -> bool {
        let finished = self.registry.shutdown(timeout).await;
        info!(bot_id = %self.id, finished, "bot stopped");
        finished
    }
}

struct Bot {
    id: BotId,
    setup: BotSetup,
    client: SharedClient,
    matchmaking: Option<MatchmakingCoordinator>,
    lifecycle: Option<SessionLifecycleManager>,
    reply: Option<ReplyScheduler>,
    registry: Arc<TaskRegistry>,
}

impl Bot {
    async fn dispatch(self: Arc<Self>, mut rx: mpsc::Receiver<InboundEvent>) {
        while let Some(event) = rx.recv().await {
            self.route(event).await;
        }
        debug!(bot_id = %self.id, "event queue closed");
    }

    #[instrument(skip_all, fields(bot_id = %self.id, session_id = %event.session_id()))]
    async fn route(&self, event: InboundEvent) {
        match event {
            InboundEvent::Presence(presence) => self.on_presence(presence).await,
            InboundEvent::Message(message) => {
                if self.is_waiting_session(&message.session_id) {
                    return;
                }
                if let Some(reply) = &self.reply {
                    let outcome = reply.on_message(message);
                    debug!(?outcome, "message handled");
                }
            }
        }
    }

    async fn on_presence(&self, presence: PresenceEvent) {
        let PresenceEvent {
            kind,
            participant,
            session_id,
        } = presence;
        if participant.id == self.setup.user || self.setup.is_excluded(&participant.name) {
            return;
        }

        if self.is_waiting_session(&session_id) {
            let Some(matchmaking) = &self.matchmaking else {
                return;
            };
            let task = match self.task_for(&participant).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    warn!(participant_id = %participant.id, "participant has no task");
                    return;
                }
                Err(e) => {
                    warn!(participant_id = %participant.id, error = %e, category = e.category(), "task lookup failed");
                    return;
                }
            };
            match kind {
                PresenceKind::Join => {
                    let outcome = matchmaking.on_join(&participant.id, &task, &session_id);
                    debug!(?outcome, "join handled");
                }
                PresenceKind::Leave => {
                    let outcome = matchmaking.on_leave(&participant.id, &task);
                    debug!(?outcome, "leave handled");
                }
            }
            return;
        }

        let Some(lifecycle) = &self.lifecycle else {
            return;
        };
        match kind {
            PresenceKind::Join => {
                if !lifecycle.on_join(&session_id, &participant.id) && self.supervises_standalone(&session_id) {
                    let _ = lifecycle.on_session_formed(self.session_spec(session_id, vec![participant.id]));
                }
            }
            PresenceKind::Leave => {
                let outcome = lifecycle.on_leave(&session_id, &participant);
                debug!(?outcome, "leave handled");
            }
        }
    }

    fn is_waiting_session(&self, session: &SessionId) -> bool {
        self.setup.waiting_session.as_ref() == Some(session)
    }

    /// Without matchmaking, the configured chat session is supervised from
    /// its first join.
    fn supervises_standalone(&self, session: &SessionId) -> bool {
        self.matchmaking.is_none() && self.setup.chat_session.as_ref() == Some(session)
    }

    async fn task_for(&self, participant: &Participant) -> ClientResult<Option<TaskId>> {
        match &self.setup.task_id {
            Some(task) => Ok(Some(task.clone())),
            None => self.client.participant_task(&participant.id).await,
        }
    }

    fn session_spec(&self, session_id: SessionId, participants: Vec<ParticipantId>) -> SessionSpec {
        SessionSpec {
            session_id,
            participants,
            duration: self.setup.chat_timeout(),
            min_occupancy: self.setup.min_occupancy,
            timeout_destination: Destination::Url(self.setup.chat_timeout_url.clone().unwrap_or_default()),
            dropout_destination: self.setup.dropout_url.clone().map(Destination::Url),
        }
    }

    async fn forward_events(self: Arc<Self>, mut events: broadcast::Receiver<RuntimeEvent>) {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(bot_id = %self.id, skipped, "runtime events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return,
            };
            debug!(bot_id = %self.id, event_type = event.event_type(), "runtime event");

            match event {
                RuntimeEvent::GroupHandedOff {
                    destination,
                    participants,
                    ..
                } => {
                    if let Some(lifecycle) = &self.lifecycle {
                        let _ = lifecycle.on_session_formed(self.session_spec(destination.clone(), participants));
                    }
                    let client = Arc::clone(&self.client);
                    let _ = self.registry.spawn(format!("ready:{destination}"), async move {
                        if let Err(e) = client.announce_session_ready(&destination).await {
                            warn!(session_id = %destination, error = %e, "ready announcement failed");
                        }
                    });
                }
                RuntimeEvent::SessionClosed { session_id, .. } => {
                    if let Some(reply) = &self.reply {
                        let _ = reply.forget_session(&session_id);
                    }
                }
                RuntimeEvent::TaskTimedOut { .. } | RuntimeEvent::ReplySent { .. } | RuntimeEvent::ReplyCancelled { .. } => {}
            }
        }
    }
}
