//! Connection management for location clients.
//!
//! This module tracks the lifecycle of client connections: assignment of
//! connection ids, the connection limit, and per-connection counters.

pub mod client;
pub mod manager;

pub use manager::ConnectionManager;

/// Type alias for connection identifiers.
///
/// Connection IDs are used to uniquely identify client connections
/// throughout their lifecycle on the server.
pub type ConnectionId = usize;
