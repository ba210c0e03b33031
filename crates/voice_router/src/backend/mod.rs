//! Voice backend interface and client lifecycle.
//!
//! The backend is the system of record for voice sessions and channels. The
//! router only ever talks to it through the narrow [`VoiceBackend`] trait:
//! list virtual servers, list users, list channels, and set a user's channel.
//!
//! [`BackendClient`] owns one backend handle bound to one selected virtual
//! server. It is constructed explicitly at startup, health-checked, shared
//! with the resolver and executor, and shut down at the end of the process.

pub mod memory;
pub mod rpc;

pub use memory::InMemoryBackend;
pub use rpc::WsRpcBackend;

use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Backend identifier of a voice session.
pub type SessionId = u32;

/// Backend identifier of a voice channel.
pub type ChannelId = i32;

/// Backend identifier of a virtual server.
pub type ServerId = i32;

/// A virtual server advertised by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHandle {
    pub id: ServerId,
    #[serde(default = "default_running")]
    pub running: bool,
}

fn default_running() -> bool {
    true
}

/// A live voice session as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub session: SessionId,
    pub name: String,
    pub channel: ChannelId,
}

/// A voice channel as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
}

/// State change sent with `setState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    pub session: SessionId,
    pub channel: ChannelId,
}

/// Query/command surface of a voice-conferencing backend.
///
/// Lists are returned in backend enumeration order; callers that pick the
/// first match rely on that order.
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    async fn get_all_servers(&self) -> Result<Vec<ServerHandle>, BackendError>;

    async fn get_users(&self, server: ServerId) -> Result<Vec<UserSession>, BackendError>;

    async fn get_channels(&self, server: ServerId) -> Result<Vec<Channel>, BackendError>;

    /// Sets the channel of a session. Setting the channel the session is
    /// already in is a no-op on the backend.
    async fn set_state(&self, server: ServerId, state: UserState) -> Result<(), BackendError>;

    /// Releases transport resources. The default does nothing.
    async fn close(&self) {}
}

/// Owned handle to the backend, bound to one virtual server.
///
/// Every call carries the configured deadline; an expired deadline is
/// reported as [`BackendError::Timeout`].
#[derive(Clone)]
pub struct BackendClient {
    backend: Arc<dyn VoiceBackend>,
    server: ServerHandle,
    call_timeout: Duration,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("server", &self.server)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl BackendClient {
    /// Connects to the backend, selects a virtual server and health-checks it.
    ///
    /// # Server Selection
    ///
    /// * `selection = Some(id)` - the server must be advertised and running
    /// * `selection = None` - exactly one server must be advertised
    ///
    /// Anything else fails with [`BackendError::ServerSelection`] so that a
    /// multi-server deployment never silently routes on an arbitrary server.
    pub async fn connect(
        backend: Arc<dyn VoiceBackend>,
        selection: Option<ServerId>,
        call_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let servers = with_deadline(call_timeout, backend.get_all_servers()).await?;
        let server = select_server(&servers, selection)?;
        info!("🎙️ Selected voice server {} ({} advertised)", server.id, servers.len());

        let client = Self {
            backend,
            server,
            call_timeout,
        };
        client.health_check().await?;
        Ok(client)
    }

    /// The virtual server this client routes on.
    pub fn server(&self) -> &ServerHandle {
        &self.server
    }

    /// Deadline applied to every call.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Verifies that the selected server is still advertised and reachable.
    pub async fn health_check(&self) -> Result<(), BackendError> {
        let servers = with_deadline(self.call_timeout, self.backend.get_all_servers()).await?;
        match servers.iter().find(|s| s.id == self.server.id) {
            Some(s) if s.running => {
                // A channel listing proves the server answers queries.
                let channels = self.channels().await?;
                debug!("Health check ok: server {} has {} channel(s)", s.id, channels.len());
                Ok(())
            }
            Some(s) => Err(BackendError::Unavailable(format!(
                "server {} is not running",
                s.id
            ))),
            None => Err(BackendError::Unavailable(format!(
                "server {} is no longer advertised",
                self.server.id
            ))),
        }
    }

    /// Current user list of the selected server.
    pub async fn users(&self) -> Result<Vec<UserSession>, BackendError> {
        with_deadline(self.call_timeout, self.backend.get_users(self.server.id)).await
    }

    /// Current channel list of the selected server.
    pub async fn channels(&self) -> Result<Vec<Channel>, BackendError> {
        with_deadline(self.call_timeout, self.backend.get_channels(self.server.id)).await
    }

    /// Moves a session into a channel.
    pub async fn set_channel(
        &self,
        session: SessionId,
        channel: ChannelId,
    ) -> Result<(), BackendError> {
        with_deadline(
            self.call_timeout,
            self.backend
                .set_state(self.server.id, UserState { session, channel }),
        )
        .await
    }

    /// Releases the backend transport.
    pub async fn shutdown(&self) {
        info!("🔌 Closing backend connection (server {})", self.server.id);
        self.backend.close().await;
    }
}

fn select_server(
    servers: &[ServerHandle],
    selection: Option<ServerId>,
) -> Result<ServerHandle, BackendError> {
    match selection {
        Some(id) => match servers.iter().find(|s| s.id == id) {
            Some(s) if s.running => Ok(s.clone()),
            Some(_) => Err(BackendError::ServerSelection(format!(
                "configured server {id} is not running"
            ))),
            None => Err(BackendError::ServerSelection(format!(
                "configured server {id} not found; backend advertises {:?}",
                server_ids(servers)
            ))),
        },
        None => match servers {
            [] => Err(BackendError::ServerSelection(
                "backend advertises no servers".to_string(),
            )),
            [only] => Ok(only.clone()),
            _ => {
                warn!("Backend advertises several servers and none is configured");
                Err(BackendError::ServerSelection(format!(
                    "backend advertises servers {:?}; set backend.server_id",
                    server_ids(servers)
                )))
            }
        },
    }
}

fn server_ids(servers: &[ServerHandle]) -> Vec<ServerId> {
    servers.iter().map(|s| s.id).collect()
}

async fn with_deadline<T>(
    deadline: Duration,
    call: impl Future<Output = Result<T, BackendError>>,
) -> Result<T, BackendError> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: ServerId) -> ServerHandle {
        ServerHandle { id, running: true }
    }

    #[test]
    fn test_select_single_server_without_configuration() {
        let selected = select_server(&[handle(1)], None).expect("single server should be selected");
        assert_eq!(selected.id, 1);
    }

    #[test]
    fn test_select_requires_configuration_for_many_servers() {
        let err = select_server(&[handle(1), handle(2)], None).unwrap_err();
        assert!(matches!(err, BackendError::ServerSelection(_)));
    }

    #[test]
    fn test_select_configured_server() {
        let selected = select_server(&[handle(1), handle(2)], Some(2)).expect("server 2 exists");
        assert_eq!(selected.id, 2);
        assert!(select_server(&[handle(1)], Some(7)).is_err());
        assert!(select_server(&[], None).is_err());
    }

    #[test]
    fn test_select_rejects_stopped_server() {
        let stopped = ServerHandle { id: 3, running: false };
        assert!(select_server(&[stopped], Some(3)).is_err());
    }

    #[tokio::test]
    async fn test_connect_and_health_check() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_channel(1, "TownChannel").await;
        let client = BackendClient::connect(backend, None, Duration::from_secs(1))
            .await
            .expect("in-memory backend should connect");
        assert_eq!(client.server().id, 1);
        assert!(client.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_deadline_is_enforced() {
        let backend = Arc::new(InMemoryBackend::new());
        let client = BackendClient::connect(backend.clone(), None, Duration::from_millis(50))
            .await
            .expect("in-memory backend should connect");
        backend.set_latency(Duration::from_millis(500));
        assert!(matches!(client.users().await, Err(BackendError::Timeout(_))));
    }
}
