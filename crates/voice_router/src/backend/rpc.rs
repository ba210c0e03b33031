//! WebSocket RPC backend.
//!
//! Talks to a backend bridge that exposes the conferencing server's
//! administration interface as JSON request/response frames:
//!
//! ```json
//! {"type":"req","id":"<uuid>","method":"getUsers","params":{"server":1}}
//! {"type":"res","id":"<uuid>","ok":true,"payload":[{"session":5,"name":"alice","channel":1}]}
//! {"type":"res","id":"<uuid>","ok":false,"error":{"code":"invalid_session","message":"..."}}
//! ```
//!
//! Responses are matched to requests by id, so several calls may be in
//! flight on the same link. When the link drops, pending calls fail with
//! [`BackendError::Unavailable`] and the next call reconnects.

use super::{Channel, ServerHandle, ServerId, UserSession, UserState, VoiceBackend};
use crate::error::BackendError;
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

/// Client → bridge request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub r#type: String, // always "req"
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Bridge → client response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub r#type: String, // always "res"
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

/// Error body of a failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

impl RequestFrame {
    fn new(id: String, method: &str, params: Option<Value>) -> Self {
        Self {
            r#type: "req".into(),
            id,
            method: method.into(),
            params,
        }
    }
}

impl ResponseFrame {
    /// Converts the frame into the payload or the matching backend error.
    fn into_result(self, state: Option<UserState>) -> Result<Value, BackendError> {
        if self.ok {
            return Ok(self.payload.unwrap_or(Value::Null));
        }
        let error = self.error.unwrap_or(ErrorShape {
            code: "unknown".into(),
            message: "request failed without error details".into(),
        });
        Err(match (error.code.as_str(), state) {
            ("invalid_session", Some(state)) => BackendError::InvalidSession(state.session),
            ("invalid_channel", Some(state)) => BackendError::InvalidChannel(state.channel),
            ("unavailable", _) => BackendError::Unavailable(error.message),
            _ => BackendError::Rejected(format!("{}: {}", error.code, error.message)),
        })
    }
}

type PendingMap = DashMap<String, oneshot::Sender<ResponseFrame>>;

/// One live WebSocket link to the bridge.
struct Link {
    write_tx: mpsc::UnboundedSender<Message>,
    pending: Arc<PendingMap>,
    alive: Arc<AtomicBool>,
}

impl Link {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.write_tx.is_closed()
    }
}

/// Removes a pending entry when the awaiting call goes away, including when
/// it is dropped by a deadline.
struct PendingGuard {
    id: String,
    pending: Arc<PendingMap>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// [`VoiceBackend`] over a WebSocket link to a backend bridge.
pub struct WsRpcBackend {
    url: String,
    link: Mutex<Option<Link>>,
}

impl WsRpcBackend {
    /// Connects to the bridge. Fails if the first connection cannot be made.
    pub async fn connect(url: impl Into<String>) -> Result<Self, BackendError> {
        let backend = Self {
            url: url.into(),
            link: Mutex::new(None),
        };
        backend.ensure_link().await?;
        Ok(backend)
    }

    /// Returns the write side and pending map of a live link, reconnecting
    /// if the previous link dropped.
    async fn ensure_link(
        &self,
    ) -> Result<(mpsc::UnboundedSender<Message>, Arc<PendingMap>), BackendError> {
        let mut guard = self.link.lock().await;
        if let Some(link) = guard.as_ref() {
            if link.is_alive() {
                return Ok((link.write_tx.clone(), link.pending.clone()));
            }
            debug!("Backend link to {} is down, reconnecting", self.url);
        }

        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| {
                BackendError::Unavailable(format!("connect to {} failed: {e}", self.url))
            })?;
        info!("🔗 Connected to backend bridge at {}", self.url);

        let (mut ws_sink, mut ws_reader) = ws_stream.split();
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Message>();
        let pending: Arc<PendingMap> = Arc::new(DashMap::new());
        let alive = Arc::new(AtomicBool::new(true));

        // Writer task
        {
            let alive = alive.clone();
            tokio::spawn(async move {
                while let Some(message) = write_rx.recv().await {
                    if let Err(e) = ws_sink.send(message).await {
                        warn!("Backend link write failed: {}", e);
                        break;
                    }
                }
                alive.store(false, Ordering::Release);
                let _ = ws_sink.close().await;
            });
        }

        // Reader task
        {
            let alive = alive.clone();
            let pending = pending.clone();
            let pong_tx = write_tx.clone();
            tokio::spawn(async move {
                while let Some(message) = ws_reader.next().await {
                    match message {
                        Ok(Message::Text(text)) => dispatch_response(&text, &pending),
                        Ok(Message::Ping(data)) => {
                            let _ = pong_tx.send(Message::Pong(data));
                        }
                        Ok(Message::Close(_)) => {
                            debug!("Backend bridge closed the link");
                            break;
                        }
                        Err(e) => {
                            warn!("Backend link read failed: {}", e);
                            break;
                        }
                        _ => {}
                    }
                }
                alive.store(false, Ordering::Release);
                // Dropping the senders wakes every waiting call.
                pending.clear();
            });
        }

        let handles = (write_tx.clone(), pending.clone());
        *guard = Some(Link {
            write_tx,
            pending,
            alive,
        });
        Ok(handles)
    }

    async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        state: Option<UserState>,
    ) -> Result<Value, BackendError> {
        let (write_tx, pending) = self.ensure_link().await?;

        let id = uuid::Uuid::new_v4().to_string();
        let (response_tx, response_rx) = oneshot::channel();
        pending.insert(id.clone(), response_tx);
        let _guard = PendingGuard {
            id: id.clone(),
            pending,
        };

        let frame = RequestFrame::new(id, method, params);
        let text = serde_json::to_string(&frame)
            .map_err(|e| BackendError::Protocol(format!("encode {method}: {e}")))?;
        trace!("→ backend {}", text);
        write_tx
            .send(Message::Text(text.into()))
            .map_err(|_| BackendError::Unavailable("backend link closed".into()))?;

        let response = response_rx.await.map_err(|_| {
            BackendError::Unavailable(format!("backend link closed before {method} completed"))
        })?;
        response.into_result(state)
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, BackendError> {
        let payload = self.call(method, params, None).await?;
        serde_json::from_value(payload)
            .map_err(|e| BackendError::Protocol(format!("decode {method} payload: {e}")))
    }
}

fn dispatch_response(text: &str, pending: &PendingMap) {
    match serde_json::from_str::<ResponseFrame>(text) {
        Ok(frame) => match pending.remove(&frame.id) {
            Some((_, response_tx)) => {
                let _ = response_tx.send(frame);
            }
            None => trace!("Dropping response for unknown request {}", frame.id),
        },
        Err(e) => warn!("Unparseable frame from backend bridge: {}", e),
    }
}

#[async_trait]
impl VoiceBackend for WsRpcBackend {
    async fn get_all_servers(&self) -> Result<Vec<ServerHandle>, BackendError> {
        self.call_typed("getAllServers", None).await
    }

    async fn get_users(&self, server: ServerId) -> Result<Vec<UserSession>, BackendError> {
        self.call_typed("getUsers", Some(json!({ "server": server })))
            .await
    }

    async fn get_channels(&self, server: ServerId) -> Result<Vec<Channel>, BackendError> {
        self.call_typed("getChannels", Some(json!({ "server": server })))
            .await
    }

    async fn set_state(&self, server: ServerId, state: UserState) -> Result<(), BackendError> {
        let params = json!({
            "server": server,
            "session": state.session,
            "channel": state.channel,
        });
        self.call("setState", Some(params), Some(state)).await?;
        Ok(())
    }

    async fn close(&self) {
        if let Some(link) = self.link.lock().await.take() {
            let _ = link.write_tx.send(Message::Close(None));
        }
    }
}
