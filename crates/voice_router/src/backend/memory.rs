//! In-process voice backend.
//!
//! Keeps servers, users and channels in memory and records every `setState`
//! call. Used for dry runs without a real conferencing server and as the
//! backend double in tests.

use super::{
    Channel, ChannelId, ServerHandle, ServerId, SessionId, UserSession, UserState, VoiceBackend,
};
use crate::error::BackendError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Registry {
    users: Vec<UserSession>,
    channels: Vec<Channel>,
    set_state_log: Vec<UserState>,
}

/// Thread-safe in-memory backend with a single registry shared by all of its
/// advertised servers.
#[derive(Debug)]
pub struct InMemoryBackend {
    servers: Vec<ServerHandle>,
    registry: RwLock<Registry>,
    latency_ms: AtomicU64,
    unavailable: AtomicBool,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// Creates a backend advertising one running server with id 1.
    pub fn new() -> Self {
        Self::with_servers(vec![ServerHandle { id: 1, running: true }])
    }

    /// Creates a backend advertising the given servers.
    pub fn with_servers(servers: Vec<ServerHandle>) -> Self {
        Self {
            servers,
            registry: RwLock::new(Registry::default()),
            latency_ms: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Creates a channel, or renames it if the id already exists.
    pub async fn add_channel(&self, id: ChannelId, name: impl Into<String>) {
        let name = name.into();
        let mut registry = self.registry.write().await;
        match registry.channels.iter_mut().find(|c| c.id == id) {
            Some(channel) => channel.name = name,
            None => registry.channels.push(Channel { id, name }),
        }
    }

    /// Removes a channel.
    pub async fn remove_channel(&self, id: ChannelId) {
        self.registry.write().await.channels.retain(|c| c.id != id);
    }

    /// Connects a user session into a channel.
    pub async fn add_user(&self, session: SessionId, name: impl Into<String>, channel: ChannelId) {
        self.registry.write().await.users.push(UserSession {
            session,
            name: name.into(),
            channel,
        });
    }

    /// Disconnects a user session.
    pub async fn remove_user(&self, session: SessionId) {
        self.registry.write().await.users.retain(|u| u.session != session);
    }

    /// Moves a session without going through `setState`, like a manual move
    /// by an administrator.
    pub async fn force_channel(&self, session: SessionId, channel: ChannelId) {
        let mut registry = self.registry.write().await;
        if let Some(user) = registry.users.iter_mut().find(|u| u.session == session) {
            user.channel = channel;
        }
    }

    /// Current state of one session.
    pub async fn user(&self, session: SessionId) -> Option<UserSession> {
        self.registry
            .read()
            .await
            .users
            .iter()
            .find(|u| u.session == session)
            .cloned()
    }

    /// Number of `setState` calls received, successful or not.
    pub async fn set_state_calls(&self) -> usize {
        self.registry.read().await.set_state_log.len()
    }

    /// Every `setState` call received, in arrival order.
    pub async fn set_state_log(&self) -> Vec<UserState> {
        self.registry.read().await.set_state_log.clone()
    }

    /// Adds an artificial delay to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Makes every call fail as if the link were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    async fn enter(&self, server: Option<ServerId>) -> Result<(), BackendError> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(BackendError::Unavailable("in-memory backend marked unavailable".into()));
        }
        if let Some(id) = server {
            if !self.servers.iter().any(|s| s.id == id) {
                return Err(BackendError::Unavailable(format!("unknown server {id}")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VoiceBackend for InMemoryBackend {
    async fn get_all_servers(&self) -> Result<Vec<ServerHandle>, BackendError> {
        self.enter(None).await?;
        Ok(self.servers.clone())
    }

    async fn get_users(&self, server: ServerId) -> Result<Vec<UserSession>, BackendError> {
        self.enter(Some(server)).await?;
        Ok(self.registry.read().await.users.clone())
    }

    async fn get_channels(&self, server: ServerId) -> Result<Vec<Channel>, BackendError> {
        self.enter(Some(server)).await?;
        Ok(self.registry.read().await.channels.clone())
    }

    async fn set_state(&self, server: ServerId, state: UserState) -> Result<(), BackendError> {
        self.enter(Some(server)).await?;
        let mut registry = self.registry.write().await;
        registry.set_state_log.push(state);

        if !registry.channels.iter().any(|c| c.id == state.channel) {
            return Err(BackendError::InvalidChannel(state.channel));
        }
        match registry.users.iter_mut().find(|u| u.session == state.session) {
            Some(user) => {
                user.channel = state.channel;
                Ok(())
            }
            None => Err(BackendError::InvalidSession(state.session)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_state_moves_user() {
        let backend = InMemoryBackend::new();
        backend.add_channel(1, "TownChannel").await;
        backend.add_channel(2, "FarmChannel").await;
        backend.add_user(5, "alice", 1).await;

        backend
            .set_state(1, UserState { session: 5, channel: 2 })
            .await
            .expect("move should succeed");

        assert_eq!(backend.user(5).await.map(|u| u.channel), Some(2));
        assert_eq!(backend.set_state_calls().await, 1);
    }

    #[tokio::test]
    async fn test_set_state_rejects_invalid_ids() {
        let backend = InMemoryBackend::new();
        backend.add_channel(1, "TownChannel").await;
        backend.add_user(5, "alice", 1).await;

        assert_eq!(
            backend.set_state(1, UserState { session: 6, channel: 1 }).await,
            Err(BackendError::InvalidSession(6))
        );
        assert_eq!(
            backend.set_state(1, UserState { session: 5, channel: 9 }).await,
            Err(BackendError::InvalidChannel(9))
        );
        assert_eq!(backend.set_state_calls().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_server_and_unavailable() {
        let backend = InMemoryBackend::new();
        assert!(matches!(
            backend.get_users(42).await,
            Err(BackendError::Unavailable(_))
        ));

        backend.set_unavailable(true);
        assert!(backend.get_all_servers().await.is_err());
        backend.set_unavailable(false);
        assert!(backend.get_all_servers().await.is_ok());
    }

    #[tokio::test]
    async fn test_add_channel_renames_existing_id() {
        let backend = InMemoryBackend::new();
        backend.add_channel(3, "Mine").await;
        backend.add_channel(3, "MineChannel").await;
        let channels = backend.get_channels(1).await.expect("server 1 exists");
        assert_eq!(channels, vec![Channel { id: 3, name: "MineChannel".into() }]);
    }
}
