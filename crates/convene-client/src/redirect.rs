//! Moving participants between sessions.
//!
//! The platform has no atomic move. A redirect is a removal from the source
//! followed by an addition to the destination; a failure between the two
//! leaves the participant in neither session. That case is logged and not
//! retried.

use convene_core::{BroadcastOptions, ParticipantId, SessionId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::SharedClient;
use crate::error::ClientResult;

/// Where a group or participant should be sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Destination {
    /// An existing session.
    Session(SessionId),
    /// An external URL, reached through a freshly created redirect session.
    Url(String),
}

/// Outcome of [`Redirector::redirect_all`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RedirectReport {
    /// Participants that reached the destination, in the order they were moved.
    pub moved: Vec<ParticipantId>,
    /// Participants whose move failed.
    pub failed: Vec<ParticipantId>,
}

impl RedirectReport {
    /// Whether every participant was moved.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Moves participants through a [`SessionClient`](crate::SessionClient).
#[derive(Clone)]
pub struct Redirector {
    client: SharedClient,
    arrival_notice: Option<String>,
}

impl Redirector {
    /// Create a redirector that announces moves in the log only.
    pub fn new(client: SharedClient) -> Self {
        Self {
            client,
            arrival_notice: None,
        }
    }

    /// Also greet each moved participant in the destination with `text`.
    #[must_use]
    pub fn with_arrival_notice(mut self, text: impl Into<String>) -> Self {
        self.arrival_notice = Some(text.into());
        self
    }

    /// The underlying client.
    pub fn client(&self) -> &SharedClient {
        &self.client
    }

    /// Turn a destination into a concrete session id.
    pub async fn resolve(&self, destination: &Destination) -> ClientResult<SessionId> {
        match destination {
            Destination::Session(id) => Ok(id.clone()),
            Destination::Url(url) => self.client.create_redirect_session(url).await,
        }
    }

    /// Move one participant from `from` to `to`.
    pub async fn redirect(&self, participant: &ParticipantId, from: &SessionId, to: &SessionId) -> ClientResult<()> {
        self.client.remove_participant(from, participant).await?;
        if let Err(e) = self.client.add_participant(to, participant).await {
            warn!(
                participant_id = %participant,
                from = %from,
                to = %to,
                error = %e,
                "participant removed but not added; left without a session"
            );
            return Err(e);
        }

        info!(participant_id = %participant, from = %from, to = %to, "participant redirected");
        if let Some(text) = &self.arrival_notice {
            if let Err(e) = self
                .client
                .broadcast(to, text, BroadcastOptions::to(participant.clone()))
                .await
            {
                warn!(participant_id = %participant, session_id = %to, error = %e, "arrival notice failed");
            }
        }
        Ok(())
    }

    /// Move each `(participant, current session)` pair to `to`, in the given
    /// order. A failed move is logged and skipped; the rest continue.
    pub async fn redirect_all<I>(&self, moves: I, to: &SessionId) -> RedirectReport
    where
        I: IntoIterator<Item = (ParticipantId, SessionId)>,
    {
        let mut report = RedirectReport::default();
        for (participant, from) in moves {
            match self.redirect(&participant, &from, to).await {
                Ok(()) => report.moved.push(participant),
                Err(e) => {
                    warn!(
                        participant_id = %participant,
                        to = %to,
                        error = %e,
                        category = e.category(),
                        "redirect failed, skipping participant"
                    );
                    report.failed.push(participant);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{Call, RecordingClient};

    fn setup() -> (Arc<RecordingClient>, Redirector) {
        let client = Arc::new(RecordingClient::new());
        let redirector = Redirector::new(client.clone());
        (client, redirector)
    }

    #[tokio::test]
    async fn redirect_removes_then_adds() {
        let (client, redirector) = setup();
        redirector
            .redirect(&"u1".into(), &"wait".into(), &"chat".into())
            .await
            .unwrap();

        assert_eq!(
            client.calls(),
            vec![
                Call::Remove {
                    session: "wait".into(),
                    participant: "u1".into()
                },
                Call::Add {
                    session: "chat".into(),
                    participant: "u1".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn failed_remove_skips_add() {
        let (client, redirector) = setup();
        client.fail_remove_for("u1");
        assert!(redirector.redirect(&"u1".into(), &"wait".into(), &"chat".into()).await.is_err());
        assert!(client.adds().is_empty());
    }

    #[tokio::test]
    async fn redirect_all_tolerates_partial_failure() {
        let (client, redirector) = setup();
        client.fail_add_for("u2");
        let moves = vec![
            (ParticipantId::from("u1"), SessionId::from("w")),
            (ParticipantId::from("u2"), SessionId::from("w")),
            (ParticipantId::from("u3"), SessionId::from("w")),
        ];

        let report = redirector.redirect_all(moves, &"dest".into()).await;
        assert_eq!(report.moved, vec![ParticipantId::from("u1"), ParticipantId::from("u3")]);
        assert_eq!(report.failed, vec![ParticipantId::from("u2")]);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn resolve_url_creates_redirect_session() {
        let (client, redirector) = setup();
        let id = redirector
            .resolve(&Destination::Url("https://x.example".into()))
            .await
            .unwrap();
        assert_eq!(
            client.calls(),
            vec![Call::CreateRedirect {
                url: "https://x.example".into()
            }]
        );
        assert!(id.as_str().starts_with("redirect-"));
    }

    #[tokio::test]
    async fn resolve_session_is_free() {
        let (client, redirector) = setup();
        let id = redirector.resolve(&Destination::Session("s9".into())).await.unwrap();
        assert_eq!(id, SessionId::from("s9"));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn arrival_notice_addressed_to_participant() {
        let client = Arc::new(RecordingClient::new());
        let redirector = Redirector::new(client.clone()).with_arrival_notice("welcome");
        redirector
            .redirect(&"u1".into(), &"a".into(), &"b".into())
            .await
            .unwrap();

        let broadcasts = client.broadcasts();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].0, SessionId::from("b"));
        assert_eq!(broadcasts[0].2.to_participant, Some(ParticipantId::from("u1")));
    }

    #[test]
    fn destination_serde() {
        let d: Destination = serde_json::from_str(r#"{"kind": "url", "value": "https://x"}"#).unwrap();
        assert_eq!(d, Destination::Url("https://x".into()));
    }
}
