//! Listener configuration.

use std::time::Duration;

use convene_settings::ServerSettings;

/// Where the server listens and how long it waits on shutdown.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free one).
    pub port: u16,
    /// How long bots get to finish their tasks on shutdown.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// `host:port` for [`tokio::net::TcpListener::bind`].
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            shutdown_timeout: settings.shutdown_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_settings() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8090);
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            shutdown_timeout: Duration::ZERO,
        };
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn from_custom_settings() {
        let settings = ServerSettings {
            port: 9000,
            shutdown_timeout_ms: 250,
            ..ServerSettings::default()
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.shutdown_timeout, Duration::from_millis(250));
    }
}
