//! Factory functions for assembling a router from configuration.
//!
//! The pieces are built bottom-up: backend transport, [`BackendClient`],
//! then the [`ChannelRouter`] and finally the [`RouterServer`] in front of it.

use crate::{
    backend::{BackendClient, InMemoryBackend, VoiceBackend, WsRpcBackend},
    config::{BackendConfig, BackendKind, RouterConfig},
    error::BackendError,
    executor::{MoveExecutor, RetryPolicy},
    resolver::SessionResolver,
    router::ChannelRouter,
    server::RouterServer,
    zones::{ZoneDirectory, ZoneTable},
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Opens the backend transport described by `config`.
///
/// The memory kind starts with one virtual server whose channels are the
/// distinct channel names of `zones`, numbered from 1 in name order. It has
/// no users; it exists to exercise the ingress and the decision pipeline
/// without a voice server.
///
/// # Errors
///
/// `Unavailable` when the bridge refuses the connection, `Timeout` when it
/// does not answer within the call timeout.
pub async fn open_backend(
    config: &BackendConfig,
    zones: &ZoneTable,
) -> Result<Arc<dyn VoiceBackend>, BackendError> {
    match config.kind {
        BackendKind::Websocket => {
            let backend = tokio::time::timeout(
                config.call_timeout(),
                WsRpcBackend::connect(config.url.clone()),
            )
            .await
            .map_err(|_| BackendError::Timeout(config.call_timeout()))??;
            Ok(Arc::new(backend))
        }
        BackendKind::Memory => {
            let backend = InMemoryBackend::new();
            let names: BTreeSet<&String> = zones.values().collect();
            let count = names.len();
            for (id, name) in (1..).zip(names) {
                backend.add_channel(id, name.clone()).await;
            }
            info!("🧪 In-memory backend seeded with {} channel(s)", count);
            Ok(Arc::new(backend))
        }
    }
}

/// Opens the backend and runs the client lifecycle up to a healthy,
/// server-bound [`BackendClient`].
pub async fn connect_backend(
    config: &BackendConfig,
    zones: &ZoneTable,
) -> Result<BackendClient, BackendError> {
    let backend = open_backend(config, zones).await?;
    BackendClient::connect(backend, config.server_id, config.call_timeout()).await
}

/// Creates the routing engine on top of a connected client.
pub fn create_router(
    config: &RouterConfig,
    client: BackendClient,
    zones: Arc<ZoneDirectory>,
) -> Arc<ChannelRouter> {
    let retry = RetryPolicy {
        retries: config.backend.move_retries,
        backoff: config.backend.retry_backoff(),
    };
    Arc::new(ChannelRouter::new(
        zones,
        SessionResolver::new(client.clone()),
        MoveExecutor::with_retry(client, retry),
        config.serialize_per_user,
    ))
}

/// Creates an ingress server in front of `router`.
pub fn create_server(config: RouterConfig, router: Arc<ChannelRouter>) -> RouterServer {
    RouterServer::new(config, router)
}
