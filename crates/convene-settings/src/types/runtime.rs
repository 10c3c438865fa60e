//! Matchmaking, lifecycle and reply settings.
//!
//! Notice texts are templates. Placeholders are substituted with
//! [`render_notice`]: `{missing}`, `{seconds}` and `{name}`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Substitute `{key}` placeholders in a notice template.
pub fn render_notice(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter()
        .fold(template.to_string(), |acc, (key, value)| acc.replace(&format!("{{{key}}}"), value))
}

/// Waiting pool settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchmakingSettings {
    /// Admission watchdog poll interval.
    pub poll_interval_ms: u64,
    /// Typing indicator shown before each notice.
    pub notice_typing_ms: u64,
    /// Pause between the completion/timeout notice and the redirects.
    pub redirect_delay_ms: u64,
    /// Sent to a joining participant while the pool is short. `{missing}`.
    pub waiting_notice: String,
    /// Sent to the waiting session when the quorum is reached.
    pub complete_notice: String,
    /// Sent to the waiting session when the admission deadline passes.
    pub timeout_notice: String,
}

impl MatchmakingSettings {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Typing indicator duration.
    pub fn notice_typing(&self) -> Duration {
        Duration::from_millis(self.notice_typing_ms)
    }

    /// Pause before redirects.
    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            notice_typing_ms: 2000,
            redirect_delay_ms: 2000,
            waiting_notice: "We are waiting for {missing} user(s) to join before we continue".to_string(),
            complete_notice: "### room complete, you will be forwarded soon".to_string(),
            timeout_notice: "## We could not fill the waiting room with sufficient number of \
                             participants you will be forwarded in a few seconds"
                .to_string(),
        }
    }
}

/// Active session supervision settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleSettings {
    /// Countdown tick interval.
    pub tick_interval_ms: u64,
    /// Broadcast the remaining time every this many ticks.
    pub broadcast_every: u64,
    /// Pause between the closing notice and the redirects.
    pub grace_period_ms: u64,
    /// Remaining-time broadcast. `{seconds}`.
    pub remaining_notice: String,
    /// Closing notice on timeout.
    pub closing_notice: String,
    /// Closing notice when occupancy drops below the minimum.
    pub dropout_notice: String,
    /// Broadcast when a participant leaves a healthy session. `{name}`.
    pub left_notice: String,
}

impl LifecycleSettings {
    /// Tick interval as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Grace period as a [`Duration`].
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            broadcast_every: 20,
            grace_period_ms: 3000,
            remaining_notice: "{seconds} seconds left".to_string(),
            closing_notice: "I will close this room in a few seconds and forward you. \
                             Thanks for participating."
                .to_string(),
            dropout_notice: "The room has not enough participants anymore. \
                             I will close the room and forward the remaining users."
                .to_string(),
            left_notice: "user {name} left".to_string(),
        }
    }
}

/// Participant move settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedirectSettings {
    /// Greeting sent to each moved participant in their new session.
    /// Empty disables it.
    pub arrival_notice: String,
}

impl RedirectSettings {
    /// The greeting, if enabled.
    pub fn arrival_notice(&self) -> Option<&str> {
        Some(self.arrival_notice.as_str()).filter(|text| !text.trim().is_empty())
    }
}

impl Default for RedirectSettings {
    fn default() -> Self {
        Self {
            arrival_notice: "You have been moved to this room.".to_string(),
        }
    }
}

/// Reply scheduling settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplySettings {
    /// Maximum transcript entries kept per session (oldest dropped first).
    pub transcript_cap: usize,
    /// Private answer to messages starting with `/`. Empty ignores them silently.
    pub command_notice: String,
    /// Simulated typing speed.
    pub typing: TypingSettings,
}

impl Default for ReplySettings {
    fn default() -> Self {
        Self {
            transcript_cap: 200,
            command_notice: "You provided a command message starting with '/'. \
                             Commands are not enabled for this chat."
                .to_string(),
            typing: TypingSettings::default(),
        }
    }
}

/// Typing delay model: `clamp(per_char * len, min, max) + uniform(0..=jitter)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TypingSettings {
    /// Delay per reply character.
    pub per_char_ms: u64,
    /// Lower bound before jitter.
    pub min_ms: u64,
    /// Upper bound before jitter.
    pub max_ms: u64,
    /// Random extra delay upper bound.
    pub jitter_ms: u64,
}

impl Default for TypingSettings {
    fn default() -> Self {
        Self {
            per_char_ms: 50,
            min_ms: 1000,
            max_ms: 8000,
            jitter_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_all_occurrences() {
        let out = render_notice("{a} and {a} but {b}", &[("a", "x"), ("b", "y")]);
        assert_eq!(out, "x and x but y");
    }

    #[test]
    fn render_leaves_unknown_placeholders() {
        assert_eq!(render_notice("{missing} left", &[]), "{missing} left");
    }

    #[test]
    fn blank_arrival_notice_is_disabled() {
        assert!(RedirectSettings::default().arrival_notice().is_some());
        let blank = RedirectSettings {
            arrival_notice: "  ".to_string(),
        };
        assert_eq!(blank.arrival_notice(), None);
    }

    #[test]
    fn default_waiting_notice_renders() {
        let s = MatchmakingSettings::default();
        assert_eq!(
            render_notice(&s.waiting_notice, &[("missing", "2")]),
            "We are waiting for 2 user(s) to join before we continue"
        );
    }

    #[test]
    fn lifecycle_durations() {
        let s = LifecycleSettings::default();
        assert_eq!(s.tick_interval(), Duration::from_secs(1));
        assert_eq!(s.grace_period(), Duration::from_secs(3));
    }
}
