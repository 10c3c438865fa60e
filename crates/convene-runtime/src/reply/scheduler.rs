use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use convene_client::SharedClient;
use convene_core::{BroadcastOptions, ChatMessage, MessageId, Participant, ParticipantId, SessionId};
use convene_llm::{GenerationRequest, SharedGenerator};
use convene_settings::ReplySettings;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::TypingPacing;
use crate::emitter::{EventEmitter, RuntimeEvent};
use crate::errors::RuntimeError;
use crate::registry::TaskRegistry;

/// Result of [`ReplyScheduler::on_message`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Sent by the bot itself; not recorded.
    IgnoredSelf,
    /// Added to the transcript without scheduling a reply.
    Recorded,
    /// A `/command`; answered privately and kept out of the transcript.
    Command,
    /// A reply operation started.
    Scheduled {
        /// Whether an in-flight reply was cancelled for it.
        preempted: bool,
    },
}

struct PendingReply {
    op_id: u64,
    triggering_message: Option<MessageId>,
    token: CancellationToken,
}

#[derive(Default)]
struct ReplyState {
    transcripts: HashMap<SessionId, VecDeque<ChatMessage>>,
    pending: HashMap<SessionId, PendingReply>,
}

impl ReplyState {
    fn append(&mut self, message: ChatMessage, cap: usize) -> &VecDeque<ChatMessage> {
        let transcript = self.transcripts.entry(message.session_id.clone()).or_default();
        transcript.push_back(message);
        while transcript.len() > cap {
            let _ = transcript.pop_front();
        }
        transcript
    }

    fn is_current(&self, session: &SessionId, op_id: u64) -> bool {
        self.pending.get(session).is_some_and(|p| p.op_id == op_id)
    }
}

struct Inner {
    bot: Participant,
    excluded_senders: Vec<String>,
    generator: SharedGenerator,
    client: SharedClient,
    pacing: TypingPacing,
    transcript_cap: usize,
    command_notice: Option<String>,
    state: Mutex<ReplyState>,
    // Serializes typing-indicator writes so a stale clear cannot land after a newer set.
    indicator: tokio::sync::Mutex<()>,
    registry: Arc<TaskRegistry>,
    emitter: Arc<EventEmitter>,
    next_op: AtomicU64,
}

impl Inner {
    async fn set_composing(&self, session: &SessionId, composing: bool) {
        if let Err(e) = self.client.set_composing(session, composing).await {
            debug!(session_id = %session, error = %e, "typing indicator failed");
        }
    }

    /// Show the indicator for `op_id` unless a newer operation replaced it.
    async fn show_composing(&self, session: &SessionId, op_id: u64) {
        let _order = self.indicator.lock().await;
        if self.state.lock().is_current(session, op_id) {
            self.set_composing(session, true).await;
        }
    }

    /// Clear the indicator unless another operation is now composing.
    async fn clear_composing(&self, session: &SessionId) {
        let _order = self.indicator.lock().await;
        if !self.state.lock().pending.contains_key(session) {
            self.set_composing(session, false).await;
        }
    }

    /// Drop the pending entry if `op_id` still owns it, and clear the
    /// indicator it set.
    async fn abandon(&self, session: &SessionId, op_id: u64) {
        let owned = {
            let mut state = self.state.lock();
            if state.is_current(session, op_id) {
                let _ = state.pending.remove(session);
                true
            } else {
                false
            }
        };
        if owned {
            self.clear_composing(session).await;
        }
    }
}

/// One in-flight reply per session; newer input wins.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ReplyScheduler {
    inner: Arc<Inner>,
}

impl ReplyScheduler {
    /// Create a scheduler replying as `bot`.
    pub fn new(
        bot: Participant,
        excluded_senders: Vec<String>,
        settings: &ReplySettings,
        generator: SharedGenerator,
        client: SharedClient,
        registry: Arc<TaskRegistry>,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        let scheduler = Self::with_pacing(
            bot,
            excluded_senders,
            settings.transcript_cap,
            TypingPacing::from(&settings.typing),
            generator,
            client,
            registry,
            emitter,
        );
        match Some(settings.command_notice.as_str()).filter(|t| !t.trim().is_empty()) {
            Some(text) => scheduler.with_command_notice(text),
            None => scheduler,
        }
    }

    /// Create a scheduler with explicit pacing.
    #[allow(clippy::too_many_arguments)]
    pub fn with_pacing(
        bot: Participant,
        excluded_senders: Vec<String>,
        transcript_cap: usize,
        pacing: TypingPacing,
        generator: SharedGenerator,
        client: SharedClient,
        registry: Arc<TaskRegistry>,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                bot,
                excluded_senders,
                generator,
                client,
                pacing,
                transcript_cap: transcript_cap.max(1),
                command_notice: None,
                state: Mutex::new(ReplyState::default()),
                indicator: tokio::sync::Mutex::new(()),
                registry,
                emitter,
                next_op: AtomicU64::new(0),
            }),
        }
    }

    /// Answer `/commands` privately with `text`.
    ///
    /// Must be called before the scheduler is cloned or used.
    #[must_use]
    pub fn with_command_notice(mut self, text: impl Into<String>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.command_notice = Some(text.into());
        }
        self
    }

    /// Record `message` and, unless it came from the bot or an excluded
    /// sender, replace any pending reply in its session with a new one.
    /// Commands neither enter the transcript nor touch the pending reply.
    #[instrument(skip_all, fields(session_id = %message.session_id, participant_id = %message.sender.id))]
    pub fn on_message(&self, message: ChatMessage) -> MessageOutcome {
        if message.sender.id == self.inner.bot.id {
            return MessageOutcome::IgnoredSelf;
        }
        if message.text.trim_start().starts_with('/') {
            self.answer_command(&message);
            return MessageOutcome::Command;
        }

        let session = message.session_id.clone();
        let sender = message.sender.id.clone();
        let trigger = message.id.clone();
        let excluded = self.inner.excluded_senders.iter().any(|n| *n == message.sender.name);

        let preempted = {
            let mut state = self.inner.state.lock();
            let transcript = state.append(message, self.inner.transcript_cap);
            if excluded {
                return MessageOutcome::Recorded;
            }
            let request = GenerationRequest {
                session_id: session.clone(),
                bot: self.inner.bot.clone(),
                transcript: transcript.iter().cloned().collect(),
            };

            let previous = state.pending.remove(&session);
            if let Some(previous) = &previous {
                previous.token.cancel();
            }

            let op_id = self.inner.next_op.fetch_add(1, Ordering::Relaxed);
            let inner = Arc::clone(&self.inner);
            let token = self.inner.registry.spawn(
                format!("reply:{session}"),
                run_reply(inner, op_id, request, sender, trigger.clone()),
            );
            let _ = state.pending.insert(
                session.clone(),
                PendingReply {
                    op_id,
                    triggering_message: trigger,
                    token,
                },
            );
            previous
        };

        match preempted {
            Some(previous) => {
                debug!("pending reply preempted");
                let _ = self.inner.emitter.emit(RuntimeEvent::ReplyCancelled {
                    session_id: session,
                    triggering_message: previous.triggering_message,
                });
                MessageOutcome::Scheduled { preempted: true }
            }
            None => MessageOutcome::Scheduled { preempted: false },
        }
    }

    fn answer_command(&self, message: &ChatMessage) {
        debug!("command message, not replying");
        let Some(text) = self.inner.command_notice.clone() else {
            return;
        };
        let client = Arc::clone(&self.inner.client);
        let session = message.session_id.clone();
        let to = message.sender.id.clone();
        let _ = self.inner.registry.spawn(format!("command:{session}:{to}"), async move {
            if let Err(e) = client.broadcast(&session, &text, BroadcastOptions::to(to)).await {
                warn!(session_id = %session, error = %e, "command notice not delivered");
            }
        });
    }

    /// Cancel the pending reply and drop the transcript of a closed session.
    pub fn forget_session(&self, session: &SessionId) -> bool {
        let mut state = self.inner.state.lock();
        if let Some(pending) = state.pending.remove(session) {
            pending.token.cancel();
        }
        state.transcripts.remove(session).is_some()
    }

    /// Transcript of `session`, oldest first.
    pub fn transcript(&self, session: &SessionId) -> Vec<ChatMessage> {
        self.inner
            .state
            .lock()
            .transcripts
            .get(session)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a reply is in flight for `session`.
    pub fn has_pending(&self, session: &SessionId) -> bool {
        self.inner.state.lock().pending.contains_key(session)
    }
}

async fn run_reply(
    inner: Arc<Inner>,
    op_id: u64,
    request: GenerationRequest,
    to: ParticipantId,
    trigger: Option<MessageId>,
) {
    let session = request.session_id.clone();
    let started = Instant::now();
    inner.show_composing(&session, op_id).await;

    let text = match inner.generator.generate(&request).await {
        Ok(Some(text)) if !text.trim().is_empty() => text,
        Ok(_) => {
            debug!(session_id = %session, generator = inner.generator.name(), "no reply");
            inner.abandon(&session, op_id).await;
            return;
        }
        Err(e) => {
            let e = RuntimeError::from(e);
            warn!(session_id = %session, error = %e, category = e.category(), "generation failed, not replying");
            inner.abandon(&session, op_id).await;
            return;
        }
    };

    let remaining = inner.pacing.delay_for(&text).saturating_sub(started.elapsed());
    tokio::time::sleep(remaining).await;

    let committed = {
        let mut state = inner.state.lock();
        if state.is_current(&session, op_id) {
            let _ = state.pending.remove(&session);
            let line = ChatMessage::new(session.clone(), inner.bot.clone(), text.clone());
            let _ = state.append(line, inner.transcript_cap);
            true
        } else {
            false
        }
    };
    if !committed {
        return;
    }

    inner.clear_composing(&session).await;
    if let Err(e) = inner
        .client
        .broadcast(&session, &text, BroadcastOptions::to(to.clone()).persistent())
        .await
    {
        warn!(session_id = %session, error = %e, "reply not delivered");
        return;
    }
    info!(session_id = %session, participant_id = %to, chars = text.chars().count(), "reply sent");
    let _ = inner.emitter.emit(RuntimeEvent::ReplySent {
        session_id: session,
        to,
        triggering_message: trigger,
    });
}
