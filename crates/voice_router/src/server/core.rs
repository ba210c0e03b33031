//! Core router server implementation.
//!
//! This module contains the `RouterServer` struct, which owns the location
//! ingress listener and hands every accepted connection to its own task.

use crate::{
    config::RouterConfig,
    connection::ConnectionManager,
    error::ServerError,
    ingress::EventIngress,
    router::ChannelRouter,
    security::SecurityManager,
    server::handlers::{handle_connection, ConnectionContext},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// The location ingress server.
///
/// `RouterServer` accepts WebSocket connections from game clients and feeds
/// their location reports to the [`ChannelRouter`]. Connections are handled
/// concurrently; reports within one connection are routed in order.
pub struct RouterServer {
    /// Server configuration settings
    config: RouterConfig,

    /// Front door shared by all connections
    ingress: EventIngress,

    /// Registry of open client connections
    connection_manager: Arc<ConnectionManager>,

    /// Size and rate guard for inbound frames
    security: Arc<SecurityManager>,

    /// Set once the accept loop must stop
    shutdown_sender: watch::Sender<bool>,
}

impl RouterServer {
    /// Creates a new server routing through `router`.
    pub fn new(config: RouterConfig, router: Arc<ChannelRouter>) -> Self {
        let ingress = EventIngress::new(router, config.security.max_message_size);
        let connection_manager = Arc::new(ConnectionManager::new(config.max_connections));
        let security = Arc::new(SecurityManager::new(config.security.clone()));
        let (shutdown_sender, _) = watch::channel(false);

        Self {
            config,
            ingress,
            connection_manager,
            security,
            shutdown_sender,
        }
    }

    pub fn router(&self) -> &Arc<ChannelRouter> {
        self.ingress.router()
    }

    pub fn connection_manager(&self) -> Arc<ConnectionManager> {
        self.connection_manager.clone()
    }

    pub fn security(&self) -> Arc<SecurityManager> {
        self.security.clone()
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| {
                ServerError::Network(format!("bind {} failed: {e}", self.config.bind_address))
            })
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Runs the accept loop on an already bound listener until
    /// [`shutdown`](Self::shutdown) is called.
    ///
    /// Open connections are not cut; they end when their client closes or
    /// their idle timeout expires.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(e.to_string()))?;
        info!("🚀 Location ingress listening on ws://{}", local_addr);

        let ctx = ConnectionContext {
            connection_manager: self.connection_manager.clone(),
            ingress: self.ingress.clone(),
            security: self.security.clone(),
            idle_timeout: (self.config.connection_timeout > 0)
                .then(|| Duration::from_secs(self.config.connection_timeout)),
        };
        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = async {
                    let _ = shutdown_receiver.wait_for(|stopped| *stopped).await;
                } => {
                    info!("🛑 Accept loop stopping - shutdown initiated");
                    break;
                }
            };

            match accepted {
                Ok((stream, addr)) => {
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, ctx).await {
                            warn!("Connection from {} failed: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    // Transient accept errors (e.g. EMFILE) should not stop the server.
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }

        info!("✅ Location ingress stopped");
        Ok(())
    }

    /// Stops the accept loop, including one that has not started yet.
    pub fn shutdown(&self) {
        self.shutdown_sender.send_replace(true);
    }

    /// Waits up to `grace` for open connections to finish.
    ///
    /// Returns the number of connections still open afterwards.
    pub async fn drain(&self, grace: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let open = self.connection_manager.connection_count().await;
            if open == 0 || tokio::time::Instant::now() >= deadline {
                return open;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
