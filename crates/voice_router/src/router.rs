//! Channel routing decisions.
//!
//! For each location event the router resolves the zone to a channel name,
//! the channel name and the username against a fresh backend snapshot, and
//! issues a move only when the session is not already in the target channel.
//!
//! # Decision Steps
//!
//! 1. `zone → channel name` (zone table, no backend call)
//! 2. `channel name → channel id` (backend channel list)
//! 3. `username → session` (backend user list, same snapshot as step 2)
//! 4. Skip if the session already sits in the target channel
//! 5. Otherwise hand a [`MoveIntent`] to the [`MoveExecutor`]
//!
//! The router is level-triggered: an event that cannot be applied is
//! dropped, and the next report for the same user is decided from scratch.

use crate::backend::{ChannelId, SessionId};
use crate::error::RouteError;
use crate::executor::{MoveExecutor, MoveIntent};
use crate::ingress::LocationEvent;
use crate::resolver::SessionResolver;
use crate::stats::RouterStats;
use crate::zones::ZoneDirectory;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// What a successfully handled event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The session was moved into the zone's channel
    Moved {
        session: SessionId,
        from: ChannelId,
        to: ChannelId,
        channel_name: String,
    },
    /// The session already was in the zone's channel; nothing was sent
    AlreadyInChannel {
        session: SessionId,
        channel: ChannelId,
    },
}

/// Decision engine turning location events into channel moves.
#[derive(Debug)]
pub struct ChannelRouter {
    zones: Arc<ZoneDirectory>,
    resolver: SessionResolver,
    executor: MoveExecutor,
    stats: Arc<RouterStats>,
    /// Per-username locks, present when decisions are serialized per user
    user_locks: Option<DashMap<String, Arc<Mutex<()>>>>,
}

impl ChannelRouter {
    /// Creates a router. With `serialize_per_user`, two events for the same
    /// username never interleave their lookup and move steps.
    pub fn new(
        zones: Arc<ZoneDirectory>,
        resolver: SessionResolver,
        executor: MoveExecutor,
        serialize_per_user: bool,
    ) -> Self {
        Self {
            zones,
            resolver,
            executor,
            stats: Arc::new(RouterStats::new()),
            user_locks: serialize_per_user.then(DashMap::new),
        }
    }

    pub fn zones(&self) -> &Arc<ZoneDirectory> {
        &self.zones
    }

    pub fn stats(&self) -> &Arc<RouterStats> {
        &self.stats
    }

    /// Handles one location event and records its outcome in the stats.
    pub async fn route(&self, event: &LocationEvent) -> Result<RouteOutcome, RouteError> {
        self.stats.record_received();

        let result = match &self.user_locks {
            Some(locks) => {
                let lock = locks
                    .entry(event.username.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();
                let result = {
                    let _held = lock.lock().await;
                    self.decide_and_move(event).await
                };
                drop(lock);
                locks.remove_if(&event.username, |_, lock| Arc::strong_count(lock) == 1);
                result
            }
            None => self.decide_and_move(event).await,
        };

        match &result {
            Ok(RouteOutcome::Moved { .. }) => self.stats.record_moved(),
            Ok(RouteOutcome::AlreadyInChannel { .. }) => self.stats.record_already_in_channel(),
            Err(e) => self.stats.record_error(e),
        }
        result
    }

    async fn decide_and_move(&self, event: &LocationEvent) -> Result<RouteOutcome, RouteError> {
        let channel_name = self
            .zones
            .resolve(&event.zone)
            .ok_or_else(|| RouteError::UnknownZone {
                zone: event.zone.clone(),
            })?;
        trace!("Zone '{}' → channel '{}'", event.zone, channel_name);

        let snapshot = self.resolver.snapshot().await?;

        let channel = snapshot
            .channel_named(&channel_name)
            .cloned()
            .ok_or_else(|| RouteError::ChannelNotProvisioned {
                channel: channel_name.clone(),
            })?;

        let session = snapshot
            .session_named(&event.username)
            .cloned()
            .ok_or_else(|| RouteError::UnknownUser {
                username: event.username.clone(),
            })?;

        if session.channel == channel.id {
            debug!(
                "'{}' already in '{}' (session {}), no move",
                event.username, channel.name, session.session
            );
            return Ok(RouteOutcome::AlreadyInChannel {
                session: session.session,
                channel: channel.id,
            });
        }

        let intent = MoveIntent {
            session: session.session,
            channel: channel.id,
            username: event.username.clone(),
            channel_name: channel.name.clone(),
        };
        self.executor.execute(&intent).await?;

        Ok(RouteOutcome::Moved {
            session: session.session,
            from: session.channel,
            to: channel.id,
            channel_name: channel.name,
        })
    }

    /// Number of usernames with a decision in flight. Zero when per-user
    /// serialization is disabled.
    pub fn users_in_flight(&self) -> usize {
        self.user_locks.as_ref().map_or(0, DashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        BackendClient, Channel, InMemoryBackend, ServerHandle, ServerId, UserSession, UserState,
        VoiceBackend,
    };
    use crate::error::BackendError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    async fn farm_world() -> Arc<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_channel(1, "TownChannel").await;
        backend.add_channel(2, "FarmChannel").await;
        backend.add_user(5, "alice", 1).await;
        backend
    }

    async fn farm_router(serialize: bool) -> (Arc<InMemoryBackend>, ChannelRouter) {
        let backend = farm_world().await;
        let router = router_on(backend.clone(), Duration::from_secs(1), serialize).await;
        (backend, router)
    }

    async fn router_on(
        backend: Arc<dyn VoiceBackend>,
        call_timeout: Duration,
        serialize: bool,
    ) -> ChannelRouter {
        let client = BackendClient::connect(backend, None, call_timeout)
            .await
            .expect("in-memory backend should connect");
        let zones = Arc::new(ZoneDirectory::new(HashMap::from([
            ("Farm".to_string(), "FarmChannel".to_string()),
            ("Town".to_string(), "TownChannel".to_string()),
            ("Mine".to_string(), "MineChannel".to_string()),
        ])));
        ChannelRouter::new(
            zones,
            SessionResolver::new(client.clone()),
            MoveExecutor::new(client),
            serialize,
        )
    }

    fn event(username: &str, zone: &str) -> LocationEvent {
        LocationEvent {
            username: username.to_string(),
            zone: zone.to_string(),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_move_then_idempotent() {
        let (backend, router) = farm_router(true).await;

        let outcome = router.route(&event("alice", "Farm")).await;
        assert_eq!(
            outcome,
            Ok(RouteOutcome::Moved {
                session: 5,
                from: 1,
                to: 2,
                channel_name: "FarmChannel".into()
            })
        );
        assert_eq!(
            router.route(&event("alice", "Farm")).await,
            Ok(RouteOutcome::AlreadyInChannel { session: 5, channel: 2 })
        );
        assert_eq!(backend.set_state_calls().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_zone_never_touches_backend() {
        let (backend, router) = farm_router(true).await;
        backend.set_unavailable(true);

        assert_eq!(
            router.route(&event("alice", "Beach")).await,
            Err(RouteError::UnknownZone { zone: "Beach".into() })
        );
        backend.set_unavailable(false);
        assert_eq!(backend.set_state_calls().await, 0);
        assert_eq!(router.stats().snapshot().unknown_zone, 1);
    }

    #[tokio::test]
    async fn test_unknown_user_is_inert() {
        let (backend, router) = farm_router(true).await;

        assert_eq!(
            router.route(&event("bob", "Farm")).await,
            Err(RouteError::UnknownUser { username: "bob".into() })
        );
        assert_eq!(backend.set_state_calls().await, 0);
    }

    #[tokio::test]
    async fn test_channel_not_provisioned() {
        let (backend, router) = farm_router(true).await;

        assert_eq!(
            router.route(&event("alice", "Mine")).await,
            Err(RouteError::ChannelNotProvisioned { channel: "MineChannel".into() })
        );
        assert_eq!(backend.set_state_calls().await, 0);
    }

    #[tokio::test]
    async fn test_manual_move_is_corrected_on_next_report() {
        let (backend, router) = farm_router(true).await;

        router.route(&event("alice", "Farm")).await.expect("first move");
        backend.force_channel(5, 1).await;
        let outcome = router.route(&event("alice", "Farm")).await.expect("second move");

        assert!(matches!(outcome, RouteOutcome::Moved { from: 1, to: 2, .. }));
        assert_eq!(backend.set_state_calls().await, 2);
    }

    #[tokio::test]
    async fn test_late_session_is_routed_by_next_event() {
        let (backend, router) = farm_router(true).await;

        assert!(router.route(&event("carol", "Farm")).await.is_err());
        backend.add_user(8, "carol", 1).await;
        assert!(matches!(
            router.route(&event("carol", "Farm")).await,
            Ok(RouteOutcome::Moved { session: 8, .. })
        ));
    }

    #[tokio::test]
    async fn test_removed_channel_after_move_is_not_provisioned() {
        let (backend, router) = farm_router(true).await;
        router.route(&event("alice", "Farm")).await.expect("first move");
        backend.force_channel(5, 1).await;

        backend.remove_channel(2).await;
        assert_eq!(
            router.route(&event("alice", "Farm")).await,
            Err(RouteError::ChannelNotProvisioned { channel: "FarmChannel".into() })
        );

        // Renamed away from the configured name behaves the same.
        backend.add_channel(2, "Barn").await;
        assert_eq!(
            router.route(&event("alice", "Farm")).await,
            Err(RouteError::ChannelNotProvisioned { channel: "FarmChannel".into() })
        );
        assert_eq!(backend.set_state_calls().await, 1);
        assert_eq!(router.stats().snapshot().channel_not_provisioned, 2);
    }

    /// Deletes the target channel or the moving session right before
    /// `setState` reaches the registry.
    struct VanishingTarget {
        inner: Arc<InMemoryBackend>,
        drop_session: bool,
    }

    #[async_trait]
    impl VoiceBackend for VanishingTarget {
        async fn get_all_servers(&self) -> Result<Vec<ServerHandle>, BackendError> {
            self.inner.get_all_servers().await
        }

        async fn get_users(&self, server: ServerId) -> Result<Vec<UserSession>, BackendError> {
            self.inner.get_users(server).await
        }

        async fn get_channels(&self, server: ServerId) -> Result<Vec<Channel>, BackendError> {
            self.inner.get_channels(server).await
        }

        async fn set_state(&self, server: ServerId, state: UserState) -> Result<(), BackendError> {
            if self.drop_session {
                self.inner.remove_user(state.session).await;
            } else {
                self.inner.remove_channel(state.channel).await;
            }
            self.inner.set_state(server, state).await
        }
    }

    #[tokio::test]
    async fn test_target_vanishing_before_move_is_rejected() {
        for drop_session in [false, true] {
            let inner = farm_world().await;
            let backend = Arc::new(VanishingTarget {
                inner: inner.clone(),
                drop_session,
            });
            let router = router_on(backend, Duration::from_secs(1), true).await;

            let err = router
                .route(&event("alice", "Farm"))
                .await
                .expect_err("stale ids must be refused");
            assert!(matches!(err, RouteError::MoveRejected(_)), "got {err:?}");
            assert_eq!(inner.set_state_calls().await, 1);
            assert_eq!(router.stats().snapshot().move_rejected, 1);
        }
    }

    #[tokio::test]
    async fn test_backend_outage_drops_event() {
        let (backend, router) = farm_router(true).await;
        backend.set_unavailable(true);

        let err = router.route(&event("alice", "Farm")).await.expect_err("backend down");
        assert!(matches!(err, RouteError::BackendUnavailable(_)));

        backend.set_unavailable(false);
        assert_eq!(backend.set_state_calls().await, 0);
        let stats = router.stats().snapshot();
        assert_eq!(stats.backend_unavailable, 1);
        assert_eq!(stats.events_received, 1);

        // The next report is decided from scratch.
        assert!(router.route(&event("alice", "Farm")).await.is_ok());
        assert_eq!(backend.user(5).await.map(|u| u.channel), Some(2));
    }

    #[tokio::test]
    async fn test_slow_snapshot_times_out() {
        let backend = farm_world().await;
        let router = router_on(backend.clone(), Duration::from_millis(50), true).await;
        backend.set_latency(Duration::from_millis(200));

        let err = router.route(&event("alice", "Farm")).await.expect_err("too slow");
        assert!(matches!(err, RouteError::Timeout(_)));
        assert_eq!(router.stats().snapshot().timeout, 1);
        assert_eq!(router.users_in_flight(), 0);

        backend.set_latency(Duration::ZERO);
        assert_eq!(backend.set_state_calls().await, 0);
    }

    #[tokio::test]
    async fn test_user_locks_are_pruned() {
        let (_backend, router) = farm_router(true).await;
        router.route(&event("alice", "Farm")).await.expect("move");
        assert_eq!(router.users_in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_serialized() {
        let (backend, router) = farm_router(true).await;
        backend.set_latency(Duration::from_millis(20));
        let router = Arc::new(router);

        let a = tokio::spawn({
            let router = router.clone();
            async move { router.route(&event("alice", "Farm")).await }
        });
        let b = tokio::spawn({
            let router = router.clone();
            async move { router.route(&event("alice", "Farm")).await }
        });
        let (a, b) = (a.await.expect("task a"), b.await.expect("task b"));
        assert!(a.is_ok() && b.is_ok());

        assert_eq!(backend.set_state_calls().await, 1);
        assert_eq!(backend.user(5).await.map(|u| u.channel), Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_unserialized() {
        let (backend, router) = farm_router(false).await;
        backend.set_latency(Duration::from_millis(20));
        let router = Arc::new(router);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let router = router.clone();
                tokio::spawn(async move { router.route(&event("alice", "Farm")).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.expect("task").is_ok());
        }

        let log = backend.set_state_log().await;
        assert!(log.len() <= 2);
        assert!(log.iter().all(|state| state.session == 5 && state.channel == 2));
        assert_eq!(backend.user(5).await.map(|u| u.channel), Some(2));
    }
}
