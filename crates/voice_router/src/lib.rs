//! # Voice Router - Location-Driven Voice Channel Routing
//!
//! Moves players between voice channels as they move between zones of a
//! game world. Game clients report `{username, location}` over a WebSocket;
//! the router maps the zone to a voice channel and, when the player's voice
//! session is somewhere else, tells the voice backend to move it.
//!
//! ## Architecture Overview
//!
//! * **Ingress** ([`server`], [`ingress`]) - accepts client connections and
//!   parses location reports
//! * **Zone directory** ([`zones`]) - in-memory `zone → channel name` table,
//!   swappable at runtime
//! * **Resolver** ([`resolver`]) - looks up sessions and channels by name on
//!   a fresh backend snapshot
//! * **Router** ([`router`]) - decides whether a move is needed
//! * **Executor** ([`executor`]) - issues the move command
//! * **Backend** ([`backend`]) - the narrow [`VoiceBackend`] interface and
//!   its owned, server-bound [`BackendClient`]
//!
//! ### Event Flow
//!
//! 1. Client sends `{"username": "alice", "location": "Farm"}`
//! 2. Zone `Farm` resolves to channel name `FarmChannel`
//! 3. `FarmChannel` and `alice` are looked up on the backend
//! 4. If alice's session is not in `FarmChannel`, a `setState` is sent
//!
//! The backend is the single source of truth. Nothing about users or
//! channels is cached, so a user moved by hand is moved back on their next
//! report, and a user who connects to voice late is picked up as soon as
//! they report again.
//!
//! ## Error Handling
//!
//! Per-event failures ([`RouteError`]) are logged and counted, never sent to
//! the client and never fatal. Only startup failures ([`BackendError`] from
//! [`BackendClient::connect`], [`ServerError`] from binding) stop the process.

pub use backend::{BackendClient, InMemoryBackend, VoiceBackend, WsRpcBackend};
pub use config::{BackendConfig, BackendKind, RouterConfig, SecurityConfig};
pub use error::{BackendError, RouteError, ServerError};
pub use ingress::{EventIngress, LocationEvent};
pub use router::{ChannelRouter, RouteOutcome};
pub use server::RouterServer;
pub use stats::{RouterStats, StatsSnapshot};
pub use utils::{connect_backend, create_router, create_server, open_backend};
pub use zones::{ZoneDirectory, ZoneTable};

pub mod backend;
pub mod config;
pub mod error;
pub mod executor;
pub mod ingress;
pub mod resolver;
pub mod router;
pub mod security;
pub mod server;
pub mod stats;
pub mod utils;
pub mod zones;

mod connection;
