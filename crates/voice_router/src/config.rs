//! Router configuration types and defaults.
//!
//! This module contains the configuration structures and default values
//! used to initialize the ingress server, the backend client and the
//! routing engine.

use crate::backend::ServerId;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration structure for the voice router.
///
/// Contains all parameters needed to run the ingress server and to route
/// location events onto the voice backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// The socket address the location ingress listens on
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent client connections allowed
    pub max_connections: usize,

    /// Idle seconds after which a client connection is dropped (0 disables)
    pub connection_timeout: u64,

    /// Backend connection and command settings
    pub backend: BackendConfig,

    /// Whether decisions for the same username are serialized
    pub serialize_per_user: bool,

    /// Ingress protection settings
    pub security: SecurityConfig,
}

/// Which [`VoiceBackend`](crate::backend::VoiceBackend) implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSON RPC frames over a WebSocket link to a backend bridge
    Websocket,
    /// In-process registry, for dry runs
    Memory,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend implementation
    pub kind: BackendKind,

    /// Bridge URL (websocket kind only)
    pub url: String,

    /// Virtual server to route on. Required when the backend hosts several.
    pub server_id: Option<ServerId>,

    /// Deadline for every backend call, in milliseconds
    pub call_timeout_ms: u64,

    /// Extra attempts for a move that failed transiently (0 disables retry)
    pub move_retries: u32,

    /// Initial delay between move attempts, doubled after each attempt
    pub retry_backoff_ms: u64,
}

impl BackendConfig {
    /// Deadline applied to every backend call.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Initial backoff between move attempts.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Security configuration for inbound frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Enable per-IP rate limiting of location frames
    pub enable_rate_limiting: bool,

    /// Maximum location frames per minute per IP
    pub max_messages_per_minute: u32,

    /// Maximum frame size in bytes
    pub max_message_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8765".parse().expect("Invalid default bind address"),
            max_connections: 1000,
            connection_timeout: 0,
            backend: BackendConfig::default(),
            serialize_per_user: true,
            security: SecurityConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Websocket,
            url: "ws://127.0.0.1:6502".to_string(),
            server_id: None,
            call_timeout_ms: 2000,
            move_retries: 0,
            retry_backoff_ms: 200,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_rate_limiting: true,
            max_messages_per_minute: 600,
            max_message_size: 4 * 1024, // 4KB
        }
    }
}
