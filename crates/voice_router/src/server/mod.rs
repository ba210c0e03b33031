//! Location ingress server and connection handling.
//!
//! This module contains the WebSocket server that accepts location clients
//! and the per-connection handling logic.

pub mod core;
pub mod handlers;

pub use core::RouterServer;
