//! Configuration management for the zonevoice router.
//!
//! This module handles loading, validation, and conversion of the router
//! configuration from TOML files and command-line arguments.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;
use voice_router::{BackendConfig, BackendKind, RouterConfig, SecurityConfig, ZoneTable};

/// Application configuration loaded from TOML file.
///
/// This is the main configuration structure that encompasses all router
/// settings: ingress networking, backend access, routing behavior, the zone
/// table and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Location ingress settings
    pub server: ServerSettings,
    /// Voice backend settings
    #[serde(default)]
    pub backend: BackendSettings,
    /// Routing behavior settings
    #[serde(default)]
    pub routing: RoutingSettings,
    /// Zone name to voice channel name
    #[serde(default = "default_zones")]
    pub zones: BTreeMap<String, String>,
    /// Inbound frame limits
    #[serde(default)]
    pub security: SecuritySettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Location ingress settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the ingress to (e.g., "0.0.0.0:8765")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle seconds before a client connection is dropped (0 disables)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
}

/// Voice backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// `websocket` for the RPC bridge, `memory` for dry runs
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,
    /// Bridge URL
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Virtual server to route on; required when the backend hosts several
    pub server_id: Option<i32>,
    /// Deadline for every backend call, in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Extra attempts for a move that failed transiently
    #[serde(default)]
    pub move_retries: u32,
    /// Initial delay between move attempts, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSettings {
    /// Never interleave two decisions for the same username
    #[serde(default = "default_true")]
    pub serialize_per_user: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    #[serde(default = "default_true")]
    pub enable_rate_limiting: bool,
    #[serde(default = "default_max_messages_per_minute")]
    pub max_messages_per_minute: u32,
    /// Maximum location frame size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

fn default_max_connections() -> usize {
    1000
}

fn default_connection_timeout() -> u64 {
    0
}

fn default_backend_kind() -> BackendKind {
    BackendKind::Websocket
}

fn default_backend_url() -> String {
    "ws://127.0.0.1:6502".to_string()
}

fn default_call_timeout_ms() -> u64 {
    2000
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_max_messages_per_minute() -> u32 {
    600
}

fn default_max_message_size() -> usize {
    4 * 1024
}

fn default_true() -> bool {
    true
}

/// Default world: one channel per zone.
pub fn default_zones() -> BTreeMap<String, String> {
    [
        ("Farm", "FarmChannel"),
        ("Town", "TownChannel"),
        ("Mine", "MineChannel"),
    ]
    .into_iter()
    .map(|(zone, channel)| (zone.to_string(), channel.to_string()))
    .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "0.0.0.0:8765".to_string(),
                max_connections: default_max_connections(),
                connection_timeout: default_connection_timeout(),
            },
            backend: BackendSettings::default(),
            routing: RoutingSettings::default(),
            zones: default_zones(),
            security: SecuritySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            url: default_backend_url(),
            server_id: None,
            call_timeout_ms: default_call_timeout_ms(),
            move_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            serialize_per_user: true,
        }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            enable_rate_limiting: true,
            max_messages_per_minute: default_max_messages_per_minute(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            Self::read_from_file(path).await
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Reads an existing configuration file without creating one.
    pub async fn read_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.backend.kind == BackendKind::Websocket
            && !(self.backend.url.starts_with("ws://") || self.backend.url.starts_with("wss://"))
        {
            return Err(format!(
                "Invalid backend url: {}. Must start with ws:// or wss://",
                &self.backend.url
            ));
        }

        if self.backend.call_timeout_ms == 0 {
            return Err("backend.call_timeout_ms must be greater than 0".to_string());
        }

        if self.zones.is_empty() {
            return Err("At least one zone must be configured".to_string());
        }
        for (zone, channel) in &self.zones {
            if zone.trim().is_empty() || channel.trim().is_empty() {
                return Err(format!(
                    "Zone entry '{zone}' = '{channel}' has an empty name"
                ));
            }
        }

        if self.security.max_message_size == 0 {
            return Err("security.max_message_size must be greater than 0".to_string());
        }
        if self.security.enable_rate_limiting && self.security.max_messages_per_minute == 0 {
            return Err("security.max_messages_per_minute must be greater than 0".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }

    /// Builds the router configuration.
    pub fn to_router_config(&self) -> Result<RouterConfig, Box<dyn std::error::Error>> {
        Ok(RouterConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            connection_timeout: self.server.connection_timeout,
            backend: BackendConfig {
                kind: self.backend.kind,
                url: self.backend.url.clone(),
                server_id: self.backend.server_id,
                call_timeout_ms: self.backend.call_timeout_ms,
                move_retries: self.backend.move_retries,
                retry_backoff_ms: self.backend.retry_backoff_ms,
            },
            serialize_per_user: self.routing.serialize_per_user,
            security: SecurityConfig {
                enable_rate_limiting: self.security.enable_rate_limiting,
                max_messages_per_minute: self.security.max_messages_per_minute,
                max_message_size: self.security.max_message_size,
            },
        })
    }

    /// The zone table in the form the router consumes.
    pub fn zone_table(&self) -> ZoneTable {
        self.zones
            .iter()
            .map(|(zone, channel)| (zone.clone(), channel.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_address, "0.0.0.0:8765");
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.backend.kind, BackendKind::Websocket);
        assert_eq!(config.backend.url, "ws://127.0.0.1:6502");
        assert_eq!(config.backend.call_timeout_ms, 2000);
        assert_eq!(config.backend.move_retries, 0);
        assert!(config.routing.serialize_per_user);
        assert_eq!(config.zones.get("Farm").map(String::as_str), Some("FarmChannel"));
        assert_eq!(config.zones.get("Town").map(String::as_str), Some("TownChannel"));
        assert_eq!(config.zones.get("Mine").map(String::as_str), Some("MineChannel"));
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_missing_file_creates_default() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path)
            .await
            .expect("Missing config should fall back to defaults");
        assert!(path.exists());
        assert_eq!(config.server.bind_address, "0.0.0.0:8765");

        let reloaded = AppConfig::read_from_file(&path)
            .await
            .expect("Written default config should parse");
        assert_eq!(reloaded.zones, default_zones());
        assert!(reloaded.backend.server_id.is_none());
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let file = NamedTempFile::new().expect("Failed to create temp file");
        let content = r#"
[server]
bind_address = "127.0.0.1:9100"

[backend]
server_id = 2

[zones]
Beach = "BeachChannel"
"#;
        fs::write(file.path(), content)
            .await
            .expect("Failed to write config");

        let config = AppConfig::load_from_file(file.path())
            .await
            .expect("Config should parse");
        assert_eq!(config.server.bind_address, "127.0.0.1:9100");
        assert_eq!(config.server.connection_timeout, 0);
        assert_eq!(config.backend.server_id, Some(2));
        assert_eq!(config.backend.url, "ws://127.0.0.1:6502");
        assert_eq!(config.zones.len(), 1);
        assert_eq!(config.zone_table().get("Beach").map(String::as_str), Some("BeachChannel"));
        assert!(config.security.enable_rate_limiting);
    }

    #[tokio::test]
    async fn test_invalid_toml_is_an_error() {
        let file = NamedTempFile::new().expect("Failed to create temp file");
        fs::write(file.path(), "[server\nbind_address = ")
            .await
            .expect("Failed to write config");
        assert!(AppConfig::read_from_file(file.path()).await.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.server.bind_address = "invalid".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.backend.url = "http://127.0.0.1:6502".to_string();
        assert!(config.validate().is_err());
        config.backend.kind = BackendKind::Memory;
        assert!(config.validate().is_ok());

        let mut config = AppConfig::default();
        config.backend.call_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.zones.insert("Cave".to_string(), " ".to_string());
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.zones.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_router_config() {
        let mut config = AppConfig::default();
        config.backend.move_retries = 2;
        config.routing.serialize_per_user = false;

        let router_config = config
            .to_router_config()
            .expect("Default config should convert to RouterConfig");
        assert_eq!(router_config.bind_address.port(), 8765);
        assert_eq!(router_config.backend.move_retries, 2);
        assert_eq!(router_config.backend.call_timeout_ms, 2000);
        assert!(!router_config.serialize_per_user);
        assert_eq!(router_config.security.max_message_size, 4096);
    }
}
