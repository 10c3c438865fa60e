//! Server, platform and logging settings.

use std::time::Duration;

use convene_core::LogFormat;
use serde::{Deserialize, Serialize};

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Capacity of each bot's inbound event queue.
    pub event_queue_capacity: usize,
    /// Maximum number of concurrently registered bots.
    pub max_bots: usize,
    /// How long shutdown waits for bot tasks before giving up.
    pub shutdown_timeout_ms: u64,
}

impl ServerSettings {
    /// Shutdown wait as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            event_queue_capacity: 256,
            max_bots: 64,
            shutdown_timeout_ms: 5000,
        }
    }
}

/// Chat platform REST settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformSettings {
    /// Base URL of the platform, without the API prefix.
    pub base_url: String,
    /// Path prefix of the REST API.
    pub api_prefix: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl PlatformSettings {
    /// Full API root, e.g. `http://localhost:5000/slurk/api`.
    pub fn api_root(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix.trim_matches('/')
        )
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            api_prefix: "/slurk/api".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Log level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug.
    Debug,
    /// Info (default).
    #[default]
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level written to stderr (overridden by `RUST_LOG`).
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_root_joins_cleanly() {
        let p = PlatformSettings {
            base_url: "http://chat.local:5000/".into(),
            api_prefix: "/slurk/api/".into(),
            request_timeout_ms: 1,
        };
        assert_eq!(p.api_root(), "http://chat.local:5000/slurk/api");
    }

    #[test]
    fn log_level_filter_strings() {
        assert_eq!(LogLevel::Warn.as_filter_str(), "warn");
        assert_eq!(LogLevel::default().as_filter_str(), "info");
    }

    #[test]
    fn shutdown_timeout_duration() {
        assert_eq!(ServerSettings::default().shutdown_timeout(), Duration::from_secs(5));
    }
}
