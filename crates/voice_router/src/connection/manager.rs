//! Connection manager for tracking location clients.

use super::{client::ClientConnection, ConnectionId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Central registry of connected location clients.
///
/// # Architecture
///
/// * Uses `RwLock<HashMap>` for thread-safe connection storage
/// * Implements atomic connection ID generation
/// * Enforces the configured connection limit on admission
#[derive(Debug)]
pub struct ConnectionManager {
    /// Map of connection ID to client connection information
    connections: Arc<RwLock<HashMap<ConnectionId, ClientConnection>>>,

    /// Atomic counter for generating unique connection IDs
    next_id: AtomicUsize,

    /// Maximum number of simultaneous connections
    max_connections: usize,
}

impl ConnectionManager {
    /// Creates a new connection manager admitting at most `max_connections`.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicUsize::new(1),
            max_connections,
        }
    }

    /// Registers a new connection.
    ///
    /// # Returns
    ///
    /// The assigned `ConnectionId`, or `None` when the server is full.
    pub async fn add_connection(&self, remote_addr: SocketAddr) -> Option<ConnectionId> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.max_connections {
            return None;
        }
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        connections.insert(connection_id, ClientConnection::new(remote_addr));
        info!("🔗 Connection {} from {}", connection_id, remote_addr);
        Some(connection_id)
    }

    /// Removes a connection from the manager.
    pub async fn remove_connection(&self, connection_id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.remove(&connection_id) {
            let open_for = connection.connected_at.elapsed().unwrap_or_default();
            info!(
                "❌ Connection {} from {} closed after {}s ({} frame(s), {} refused)",
                connection_id,
                connection.remote_addr,
                open_for.as_secs(),
                connection.frames,
                connection.rejected
            );
        }
    }

    /// Counts a received frame, and whether the ingress guard refused it.
    pub async fn record_frame(&self, connection_id: ConnectionId, rejected: bool) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&connection_id) {
            connection.frames += 1;
            if rejected {
                connection.rejected += 1;
            }
        }
    }

    /// Returns a copy of one connection's record.
    #[cfg(test)]
    pub async fn get_connection(&self, connection_id: ConnectionId) -> Option<ClientConnection> {
        self.connections.read().await.get(&connection_id).cloned()
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
