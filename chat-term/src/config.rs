//! Terminal client configuration.

use std::path::Path;
use std::time::Duration;

use chat_core::{ChatError, ConnectionInfo, DEFAULT_CHAT_ENDPOINT};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the terminal client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address and request timeout.
    pub network: NetworkConfig,
    /// Chat session handshake.
    pub session: SessionConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server host name or IP.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path the streaming handshake is sent to.
    pub endpoint: String,
    /// Handshake timeout in milliseconds.
    pub handshake_timeout_ms: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, used when `RUST_LOG` is unset.
    pub level: String,
    /// Optional log file; empty logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            request_timeout_ms: 5000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CHAT_ENDPOINT.into(),
            handshake_timeout_ms: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Accessors ────────────────────────────────────────────────────

impl NetworkConfig {
    pub fn server(&self) -> ConnectionInfo {
        ConnectionInfo::new(self.host.clone(), self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl SessionConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Point the client at `server`, given as `host:port`.
    pub fn override_server(&mut self, server: &str) -> Result<(), ChatError> {
        let info: ConnectionInfo = server.parse()?;
        self.network.host = info.host().to_string();
        self.network.port = info.port();
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        assert!(text.contains("[network]"));
        assert!(text.contains("request_timeout_ms"));
        assert!(text.contains("/api/v1/chatting"));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.port, 8080);
        assert_eq!(parsed.session.endpoint, DEFAULT_CHAT_ENDPOINT);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed: ClientConfig = toml::from_str("[network]\nport = 9000\n").unwrap();
        assert_eq!(parsed.network.port, 9000);
        assert_eq!(parsed.network.host, "127.0.0.1");
        assert_eq!(parsed.session.handshake_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = ClientConfig::load(Path::new("/nonexistent/chat-term.toml"));
        assert_eq!(cfg.network.request_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn server_override() {
        let mut cfg = ClientConfig::default();
        cfg.override_server("chat.example.org:7000").unwrap();
        assert_eq!(cfg.network.server(), ConnectionInfo::new("chat.example.org", 7000));
        assert!(cfg.override_server("no-port").is_err());
    }
}
