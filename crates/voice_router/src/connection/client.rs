//! Client connection representation.

use std::net::SocketAddr;
use std::time::SystemTime;

/// Represents an individual location client connected to the server.
///
/// # Fields
///
/// * `remote_addr` - The network address of the connected client
/// * `connected_at` - Timestamp when the connection was established
/// * `frames` - Number of text frames received
/// * `rejected` - Frames refused by the ingress guard
#[derive(Debug, Clone)]
pub struct ClientConnection {
    /// The remote network address of the client
    pub remote_addr: SocketAddr,

    /// When this connection was established
    pub connected_at: SystemTime,

    /// Text frames received on this connection
    pub frames: u64,

    /// Frames refused before routing (size or rate limit)
    pub rejected: u64,
}

impl ClientConnection {
    /// Creates a new client connection with the specified remote address.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            connected_at: SystemTime::now(),
            frames: 0,
            rejected: 0,
        }
    }
}
