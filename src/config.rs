//! Application configuration
//!
//! TOML file (default `~/.config/voltmesh-csms/config.toml`, override the
//! path with `VOLTMESH_CONFIG`) plus `VOLTMESH_*` environment overrides for
//! the individual options.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ocpp: OcppConfig,
    pub logging: LoggingConfig,
    /// ID-tag seed set loaded into the authorization registry at startup
    pub tags: Vec<IdTagSeed>,
}

/// Listener addresses
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// OCPP WebSocket listener
    pub host: String,
    pub port: u16,
    /// REST API + dashboard WebSocket listener
    pub api_host: String,
    pub api_port: u16,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
        }
    }
}

/// OCPP protocol behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcppConfig {
    /// Heartbeat interval returned in BootNotification (seconds)
    pub heartbeat_interval: i32,
    /// Transport-level keepalive ping cadence (seconds)
    pub ping_interval: u64,
    /// Deadline for outbound calls awaiting a response (seconds)
    pub pending_request_ttl: u64,
    /// Development profile: authorize unknown ID tags
    pub accept_unknown_tags: bool,
    /// Outbound queue high-water mark per connection
    pub max_outbound_queue: usize,
}

impl Default for OcppConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: 300,
            ping_interval: 30,
            pending_request_ttl: 30,
            accept_unknown_tags: false,
            max_outbound_queue: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Severity floor (`trace`..`error`), also an `EnvFilter` directive
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One seeded ID tag
#[derive(Debug, Clone, Deserialize)]
pub struct IdTagSeed {
    pub value: String,
    /// `Accepted`, `Blocked`, `Expired`, `Invalid` or `ConcurrentTx`
    #[serde(default = "default_tag_status")]
    pub status: String,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parent_id_tag: Option<String>,
}

fn default_tag_status() -> String {
    "Accepted".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("VOLTMESH_LISTEN_ADDR") {
            if let Some((host, port)) = parse_addr(&addr) {
                self.server.host = host;
                self.server.port = port;
            }
        }
        if let Ok(addr) = std::env::var("VOLTMESH_API_ADDR") {
            if let Some((host, port)) = parse_addr(&addr) {
                self.server.api_host = host;
                self.server.api_port = port;
            }
        }
        if let Ok(v) = std::env::var("VOLTMESH_HEARTBEAT_INTERVAL") {
            if let Ok(v) = v.parse() {
                self.ocpp.heartbeat_interval = v;
            }
        }
        if let Ok(v) = std::env::var("VOLTMESH_PING_INTERVAL") {
            if let Ok(v) = v.parse() {
                self.ocpp.ping_interval = v;
            }
        }
        if let Ok(v) = std::env::var("VOLTMESH_PENDING_REQUEST_TTL") {
            if let Ok(v) = v.parse() {
                self.ocpp.pending_request_ttl = v;
            }
        }
        if let Ok(v) = std::env::var("VOLTMESH_ACCEPT_UNKNOWN_TAGS") {
            self.ocpp.accept_unknown_tags = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("VOLTMESH_MAX_OUTBOUND_QUEUE") {
            if let Ok(v) = v.parse() {
                self.ocpp.max_outbound_queue = v;
            }
        }
        if let Ok(v) = std::env::var("VOLTMESH_LOG_LEVEL") {
            self.logging.level = v;
        }
    }
}

fn parse_addr(addr: &str) -> Option<(String, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    let port = port.parse().ok()?;
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

/// Default configuration file location
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voltmesh-csms")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.server.listen_addr(), "0.0.0.0:9000");
        assert_eq!(config.server.api_addr(), "0.0.0.0:8080");
        assert_eq!(config.ocpp.heartbeat_interval, 300);
        assert_eq!(config.ocpp.ping_interval, 30);
        assert_eq!(config.ocpp.pending_request_ttl, 30);
        assert!(!config.ocpp.accept_unknown_tags);
        assert!(config.tags.is_empty());
    }

    #[test]
    fn parse_full_file() {
        let raw = r#"
            [server]
            host = "127.0.0.1"
            port = 9100
            api_port = 8180

            [ocpp]
            heartbeat_interval = 60
            accept_unknown_tags = true

            [logging]
            level = "debug"

            [[tags]]
            value = "TAG-001"

            [[tags]]
            value = "TAG-002"
            status = "Blocked"
            parent_id_tag = "FLEET1"
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.server.listen_addr(), "127.0.0.1:9100");
        assert_eq!(config.server.api_addr(), "0.0.0.0:8180");
        assert_eq!(config.ocpp.heartbeat_interval, 60);
        assert!(config.ocpp.accept_unknown_tags);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.tags.len(), 2);
        assert_eq!(config.tags[0].status, "Accepted");
        assert_eq!(config.tags[1].status, "Blocked");
        assert_eq!(config.tags[1].parent_id_tag.as_deref(), Some("FLEET1"));
    }

    #[test]
    fn addr_parsing() {
        assert_eq!(parse_addr("0.0.0.0:9000"), Some(("0.0.0.0".to_string(), 9000)));
        assert_eq!(parse_addr("bad"), None);
        assert_eq!(parse_addr(":9000"), None);
        assert_eq!(parse_addr("host:notaport"), None);
    }
}
