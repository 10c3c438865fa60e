//! Per-bot registration record.
//!
//! A [`BotSetup`] is posted once when a bot instance is registered and never
//! changes afterwards. Field names follow the platform's camelCase JSON.

use std::collections::BTreeSet;
use std::time::Duration;

use convene_core::{ParticipantId, SessionId, TaskId};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Responsibilities a bot instance takes on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BotRole {
    /// Waiting pool admission and hand-off.
    Matchmaking,
    /// Countdown, timeout and dropout supervision of formed sessions.
    Lifecycle,
    /// Generated replies to participant messages.
    Reply,
}

fn all_roles() -> BTreeSet<BotRole> {
    [BotRole::Matchmaking, BotRole::Lifecycle, BotRole::Reply].into_iter().collect()
}

fn default_name() -> String {
    "ConveneBot".to_string()
}

fn default_quorum() -> usize {
    2
}

/// Registration record for one bot instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSetup {
    /// Platform admission token the bot authenticates with.
    pub token: String,
    /// Platform participant id of the bot itself.
    pub user: ParticipantId,
    /// Display name of the bot.
    #[serde(default = "default_name")]
    pub name: String,
    /// Enabled responsibilities.
    #[serde(default = "all_roles")]
    pub roles: BTreeSet<BotRole>,
    /// Waiting pool session. Required for matchmaking.
    #[serde(default)]
    pub waiting_session: Option<SessionId>,
    /// Fixed destination for handed-off groups. A fresh session is created
    /// per hand-off when absent.
    #[serde(default)]
    pub chat_session: Option<SessionId>,
    /// Task pinned to this bot's waiting pool. When absent the task is looked
    /// up per participant on the platform.
    #[serde(default)]
    pub task_id: Option<TaskId>,
    /// Participants needed to form a session.
    #[serde(default = "default_quorum")]
    pub quorum: usize,
    /// Minimum occupancy of a formed session. `0` disables the dropout path.
    #[serde(default)]
    pub min_occupancy: usize,
    /// Admission deadline, counted from the first join.
    #[serde(default)]
    pub waiting_timeout_secs: u64,
    /// Where participants go when the admission deadline passes.
    #[serde(default)]
    pub waiting_timeout_url: Option<String>,
    /// Lifetime of a formed session.
    #[serde(default)]
    pub chat_timeout_secs: u64,
    /// Where participants go when a formed session times out.
    #[serde(default)]
    pub chat_timeout_url: Option<String>,
    /// Where remaining participants go on dropout.
    #[serde(default)]
    pub dropout_url: Option<String>,
    /// Sender names whose messages are recorded but never answered, and
    /// whose presence is ignored.
    #[serde(default)]
    pub excluded_senders: Vec<String>,
}

impl BotSetup {
    /// Whether this bot takes on `role`.
    pub fn has_role(&self, role: BotRole) -> bool {
        self.roles.contains(&role)
    }

    /// Admission deadline as a [`Duration`].
    pub fn waiting_timeout(&self) -> Duration {
        Duration::from_secs(self.waiting_timeout_secs)
    }

    /// Session lifetime as a [`Duration`].
    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs)
    }

    /// Whether `name` is an administrative sender.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded_senders.iter().any(|n| n == name)
    }

    /// Check the record for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(invalid("token must not be empty"));
        }
        if self.roles.is_empty() {
            return Err(invalid("at least one role is required"));
        }
        if self.has_role(BotRole::Matchmaking) {
            if self.quorum == 0 {
                return Err(invalid("quorum must be at least 1"));
            }
            if self.waiting_session.is_none() {
                return Err(invalid("matchmaking requires waitingSession"));
            }
            if self.waiting_timeout_secs == 0 {
                return Err(invalid("waitingTimeoutSecs must be positive"));
            }
            require_url("waitingTimeoutUrl", self.waiting_timeout_url.as_deref())?;
        }
        if self.has_role(BotRole::Lifecycle) {
            if self.chat_timeout_secs == 0 {
                return Err(invalid("chatTimeoutSecs must be positive"));
            }
            require_url("chatTimeoutUrl", self.chat_timeout_url.as_deref())?;
            if self.min_occupancy > self.quorum {
                return Err(invalid(format!(
                    "minOccupancy ({}) must not exceed quorum ({})",
                    self.min_occupancy, self.quorum
                )));
            }
            if self.min_occupancy > 0 {
                require_url("dropoutUrl", self.dropout_url.as_deref())?;
            }
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> SettingsError {
    SettingsError::InvalidSetup(msg.into())
}

fn require_url(field: &str, value: Option<&str>) -> Result<()> {
    match value.map(str::trim) {
        Some(url) if !url.is_empty() => Ok(()),
        _ => Err(invalid(format!("{field} must be a non-empty URL"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn full() -> BotSetup {
        serde_json::from_value(serde_json::json!({
            "token": "abc",
            "user": 7,
            "waitingSession": 1,
            "quorum": 3,
            "minOccupancy": 2,
            "waitingTimeoutSecs": 300,
            "waitingTimeoutUrl": "https://survey.example/timeout",
            "chatTimeoutSecs": 600,
            "chatTimeoutUrl": "https://survey.example/done",
            "dropoutUrl": "https://survey.example/dropout",
            "excludedSenders": ["Manager"]
        }))
        .unwrap()
    }

    #[test]
    fn full_setup_is_valid() {
        let setup = full();
        setup.validate().unwrap();
        assert_eq!(setup.user.as_str(), "7");
        assert_eq!(setup.name, "ConveneBot");
        assert!(setup.has_role(BotRole::Reply));
        assert_eq!(setup.waiting_timeout(), Duration::from_secs(300));
        assert!(setup.is_excluded("Manager"));
        assert!(!setup.is_excluded("alice"));
    }

    #[test]
    fn zero_quorum_rejected() {
        let mut setup = full();
        setup.quorum = 0;
        setup.min_occupancy = 0;
        assert_matches!(setup.validate(), Err(SettingsError::InvalidSetup(m)) if m.contains("quorum"));
    }

    #[test]
    fn min_occupancy_above_quorum_rejected() {
        let mut setup = full();
        setup.min_occupancy = 4;
        assert_matches!(setup.validate(), Err(SettingsError::InvalidSetup(m)) if m.contains("minOccupancy"));
    }

    #[test]
    fn empty_timeout_url_rejected() {
        let mut setup = full();
        setup.waiting_timeout_url = Some("  ".into());
        assert_matches!(setup.validate(), Err(SettingsError::InvalidSetup(m)) if m.contains("waitingTimeoutUrl"));
    }

    #[test]
    fn dropout_url_optional_when_disabled() {
        let mut setup = full();
        setup.min_occupancy = 0;
        setup.dropout_url = None;
        setup.validate().unwrap();
    }

    #[test]
    fn reply_only_bot_needs_no_sessions() {
        let setup: BotSetup = serde_json::from_value(serde_json::json!({
            "token": "t",
            "user": "bot",
            "roles": ["reply"]
        }))
        .unwrap();
        setup.validate().unwrap();
        assert!(!setup.has_role(BotRole::Matchmaking));
    }

    #[test]
    fn matchmaking_requires_waiting_session() {
        let mut setup = full();
        setup.waiting_session = None;
        assert_matches!(setup.validate(), Err(SettingsError::InvalidSetup(_)));
    }

    #[test]
    fn empty_roles_rejected() {
        let mut setup = full();
        setup.roles.clear();
        assert!(setup.validate().is_err());
    }
}
