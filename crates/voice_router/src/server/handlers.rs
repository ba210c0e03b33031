//! Connection handling logic for location clients.
//!
//! This module contains the per-connection task: WebSocket handshaking,
//! admission, in-order frame processing, and cleanup.

use crate::{
    connection::ConnectionManager,
    error::{RouteError, ServerError},
    ingress::EventIngress,
    security::{SecurityError, SecurityManager},
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
};
use tracing::{debug, error, trace, warn};

/// Shared state every connection task needs.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub connection_manager: Arc<ConnectionManager>,
    pub ingress: EventIngress,
    pub security: Arc<SecurityManager>,
    /// Idle time after which the connection is dropped, if any
    pub idle_timeout: Option<Duration>,
}

/// Handles a single client connection from handshake to cleanup.
///
/// # Connection Flow
///
/// 1. Perform WebSocket handshake
/// 2. Register the connection (refused with a close frame when full)
/// 3. Route each text frame before reading the next one, so reports from
///    one connection are applied in arrival order
/// 4. Unregister on close, error or idle timeout
///
/// Clients receive no acknowledgement for their reports.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: ConnectionContext,
) -> Result<(), ServerError> {
    // Perform WebSocket handshake
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let Some(connection_id) = ctx.connection_manager.add_connection(addr).await else {
        warn!("🚫 Refusing {}: connection limit reached", addr);
        let close = Message::Close(Some(CloseFrame {
            code: CloseCode::Again,
            reason: "Server full".into(),
        }));
        let _ = ws_sender.send(close).await;
        return Ok(());
    };

    loop {
        let next = match ctx.idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, ws_receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    debug!("⏱️ Connection {} idle for {:?}, closing", connection_id, idle);
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            },
            None => ws_receiver.next().await,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                let rejected = match ctx.security.validate_frame(addr.ip(), text.as_bytes()).await {
                    Ok(()) => {
                        // Routing errors are logged by the ingress and never
                        // end the connection.
                        let _ = ctx.ingress.handle_text(&text).await;
                        false
                    }
                    Err(SecurityError::MessageTooLarge(size)) => {
                        ctx.ingress.reject(RouteError::MalformedEvent(format!(
                            "frame of {size} bytes from {addr} exceeds limit"
                        )));
                        true
                    }
                    Err(e) => {
                        warn!("🛡️ Frame from {} refused: {}", addr, e);
                        true
                    }
                };
                ctx.connection_manager
                    .record_frame(connection_id, rejected)
                    .await;
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = ws_sender.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) | None => {
                debug!("🔌 Client {} requested close", connection_id);
                break;
            }
            Some(Ok(Message::Binary(data))) => {
                trace!("Ignoring {} byte binary frame from {}", data.len(), connection_id);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!("WebSocket error for connection {}: {}", connection_id, e);
                break;
            }
        }
    }

    ctx.connection_manager.remove_connection(connection_id).await;
    Ok(())
}
