//! Location report parsing and hand-off to the router.
//!
//! Clients send one JSON object per text frame:
//!
//! ```json
//! { "username": "alice", "location": "Farm" }
//! ```
//!
//! `location` is the human-readable zone name. Other fields are ignored.
//! Nothing is sent back to the client.

use crate::error::RouteError;
use crate::router::{ChannelRouter, RouteOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// A parsed location report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEvent {
    pub username: String,
    pub zone: String,
    /// Receive time in milliseconds since the Unix epoch
    pub timestamp: Option<u64>,
}

/// Parses a text frame into a [`LocationEvent`].
///
/// # Errors
///
/// `MalformedEvent` when the frame exceeds `max_size`, is not a JSON object,
/// or lacks a non-empty string `username` or `location`.
pub fn parse_location_event(text: &str, max_size: usize) -> Result<LocationEvent, RouteError> {
    if text.len() > max_size {
        return Err(RouteError::MalformedEvent(format!(
            "frame of {} bytes exceeds limit of {}",
            text.len(),
            max_size
        )));
    }

    let json: Value = serde_json::from_str(text)
        .map_err(|e| RouteError::MalformedEvent(format!("invalid JSON: {e}")))?;
    let object = json
        .as_object()
        .ok_or_else(|| RouteError::MalformedEvent("expected a JSON object".to_string()))?;

    let field = |name: &str| -> Result<String, RouteError> {
        match object.get(name) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
            Some(Value::String(_)) => Err(RouteError::MalformedEvent(format!("empty '{name}'"))),
            Some(_) => Err(RouteError::MalformedEvent(format!("'{name}' must be a string"))),
            None => Err(RouteError::MalformedEvent(format!("missing '{name}'"))),
        }
    };

    Ok(LocationEvent {
        username: field("username")?,
        zone: field("location")?,
        timestamp: Some(current_timestamp()),
    })
}

/// Milliseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Stateless front door of the router.
///
/// Every frame produces exactly one log record describing its outcome.
#[derive(Debug, Clone)]
pub struct EventIngress {
    router: Arc<ChannelRouter>,
    max_message_size: usize,
}

impl EventIngress {
    pub fn new(router: Arc<ChannelRouter>, max_message_size: usize) -> Self {
        Self {
            router,
            max_message_size,
        }
    }

    pub fn router(&self) -> &Arc<ChannelRouter> {
        &self.router
    }

    /// Parses and routes one text frame.
    pub async fn handle_text(&self, text: &str) -> Result<RouteOutcome, RouteError> {
        let event = match parse_location_event(text, self.max_message_size) {
            Ok(event) => event,
            Err(e) => return Err(self.reject(e)),
        };

        let result = self.router.route(&event).await;
        log_outcome(&event, &result);
        result
    }

    /// Counts and logs a frame that never became an event.
    pub fn reject(&self, error: RouteError) -> RouteError {
        let stats = self.router.stats();
        stats.record_received();
        stats.record_error(&error);
        warn!("📭 Dropped frame: {}", error);
        error
    }
}

fn log_outcome(event: &LocationEvent, result: &Result<RouteOutcome, RouteError>) {
    match result {
        Ok(RouteOutcome::Moved {
            session,
            from,
            to,
            channel_name,
        }) => info!(
            "🔀 Moved {} (session {}) from channel {} to '{}' ({}) for zone '{}'",
            event.username, session, from, channel_name, to, event.zone
        ),
        Ok(RouteOutcome::AlreadyInChannel { .. }) => {
            debug!("{} already in the channel for '{}'", event.username, event.zone)
        }
        Err(e) if e.is_expected() => {
            debug!("Dropped location of {} ({}): {}", event.username, e.kind(), e)
        }
        Err(e) => warn!(
            "⚠️ Dropped location of {} in '{}' ({}): {}",
            event.username,
            event.zone,
            e.kind(),
            e
        ),
    }
}
