//! Human-like typing delay.

use std::time::Duration;

use convene_settings::TypingSettings;
use rand::Rng;

/// Delay proportional to reply length, clamped, plus uniform jitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypingPacing {
    per_char_ms: u64,
    min_ms: u64,
    max_ms: u64,
    jitter_ms: u64,
}

impl TypingPacing {
    /// No delay at all.
    pub fn instant() -> Self {
        Self {
            per_char_ms: 0,
            min_ms: 0,
            max_ms: 0,
            jitter_ms: 0,
        }
    }

    /// How long typing `text` should appear to take.
    pub fn delay_for(&self, text: &str) -> Duration {
        let chars = u64::try_from(text.chars().count()).unwrap_or(u64::MAX);
        let base = self
            .per_char_ms
            .saturating_mul(chars)
            .clamp(self.min_ms, self.max_ms.max(self.min_ms));
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=self.jitter_ms)
        };
        Duration::from_millis(base.saturating_add(jitter))
    }
}

impl From<&TypingSettings> for TypingPacing {
    fn from(settings: &TypingSettings) -> Self {
        Self {
            per_char_ms: settings.per_char_ms,
            min_ms: settings.min_ms,
            max_ms: settings.max_ms,
            jitter_ms: settings.jitter_ms,
        }
    }
}
