//! Session and channel lookups against the live backend state.
//!
//! Nothing here is cached: each lookup fetches the backend's current list,
//! because channel membership can change between two location reports. A
//! routing decision takes one [`BackendSnapshot`] and answers both of its
//! questions from it.

use crate::backend::{BackendClient, Channel, UserSession};
use crate::error::RouteError;
use tracing::debug;

/// Users and channels fetched together for a single decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSnapshot {
    pub users: Vec<UserSession>,
    pub channels: Vec<Channel>,
}

impl BackendSnapshot {
    /// First session with exactly this name, in enumeration order.
    pub fn session_named(&self, username: &str) -> Option<&UserSession> {
        first_session_named(&self.users, username)
    }

    /// First channel with exactly this name, in enumeration order.
    pub fn channel_named(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }
}

/// Resolves usernames and channel names to backend identifiers.
#[derive(Debug, Clone)]
pub struct SessionResolver {
    client: BackendClient,
}

impl SessionResolver {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    /// Fetches the current user and channel lists.
    pub async fn snapshot(&self) -> Result<BackendSnapshot, RouteError> {
        let (users, channels) = tokio::try_join!(self.client.users(), self.client.channels())?;
        Ok(BackendSnapshot { users, channels })
    }

    /// Finds the voice session of a user by exact, case-sensitive name.
    ///
    /// The backend allows several sessions with the same name. The first one
    /// in backend enumeration order wins.
    pub async fn find_session_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserSession>, RouteError> {
        let users = self.client.users().await?;
        Ok(first_session_named(&users, username).cloned())
    }

    /// Finds a channel by exact name, first match in enumeration order.
    pub async fn find_channel_by_name(&self, name: &str) -> Result<Option<Channel>, RouteError> {
        let channels = self.client.channels().await?;
        Ok(channels.into_iter().find(|c| c.name == name))
    }
}

fn first_session_named<'a>(users: &'a [UserSession], username: &str) -> Option<&'a UserSession> {
    let mut matches = users.iter().filter(|u| u.name == username);
    let first = matches.next()?;
    let others = matches.count();
    if others > 0 {
        debug!(
            "{} sessions share the name '{}'; using session {}",
            others + 1,
            username,
            first.session
        );
    }
    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use std::sync::Arc;
    use std::time::Duration;

    async fn resolver_with(backend: Arc<InMemoryBackend>) -> SessionResolver {
        let client = BackendClient::connect(backend, None, Duration::from_secs(1))
            .await
            .expect("in-memory backend should connect");
        SessionResolver::new(client)
    }

    #[tokio::test]
    async fn test_find_session_exact_match() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_channel(1, "TownChannel").await;
        backend.add_user(5, "alice", 1).await;
        let resolver = resolver_with(backend).await;

        let session = resolver
            .find_session_by_username("alice")
            .await
            .expect("backend reachable");
        assert_eq!(session.map(|s| s.session), Some(5));

        assert_eq!(resolver.find_session_by_username("Alice").await, Ok(None));
        assert_eq!(resolver.find_session_by_username("bob").await, Ok(None));
    }

    #[tokio::test]
    async fn test_duplicate_names_take_first_in_enumeration_order() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_channel(1, "TownChannel").await;
        backend.add_user(9, "alice", 1).await;
        backend.add_user(3, "alice", 1).await;
        let resolver = resolver_with(backend).await;

        let session = resolver
            .find_session_by_username("alice")
            .await
            .expect("backend reachable");
        assert_eq!(session.map(|s| s.session), Some(9));
    }

    #[tokio::test]
    async fn test_find_channel_by_name() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_channel(1, "TownChannel").await;
        backend.add_channel(2, "FarmChannel").await;
        let resolver = resolver_with(backend).await;

        let channel = resolver
            .find_channel_by_name("FarmChannel")
            .await
            .expect("backend reachable");
        assert_eq!(channel.map(|c| c.id), Some(2));
        assert_eq!(resolver.find_channel_by_name("MineChannel").await, Ok(None));
    }

    #[tokio::test]
    async fn test_snapshot_answers_both_lookups() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_channel(1, "TownChannel").await;
        backend.add_channel(2, "FarmChannel").await;
        backend.add_user(5, "alice", 1).await;
        let resolver = resolver_with(backend).await;

        let snapshot = resolver.snapshot().await.expect("backend reachable");
        assert_eq!(snapshot.session_named("alice").map(|s| s.channel), Some(1));
        assert_eq!(snapshot.channel_named("FarmChannel").map(|c| c.id), Some(2));
        assert!(snapshot.channel_named("farmchannel").is_none());
    }

    #[tokio::test]
    async fn test_lookups_are_not_cached() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_channel(1, "TownChannel").await;
        let resolver = resolver_with(backend.clone()).await;

        assert_eq!(resolver.find_session_by_username("alice").await, Ok(None));
        backend.add_user(5, "alice", 1).await;
        assert!(resolver
            .find_session_by_username("alice")
            .await
            .expect("backend reachable")
            .is_some());
    }

    #[tokio::test]
    async fn test_backend_failure_is_reported() {
        let backend = Arc::new(InMemoryBackend::new());
        let resolver = resolver_with(backend.clone()).await;
        backend.set_unavailable(true);

        assert!(matches!(
            resolver.find_channel_by_name("FarmChannel").await,
            Err(RouteError::BackendUnavailable(_))
        ));
    }
}
