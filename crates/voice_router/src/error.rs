//! Error types and handling for the voice router.
//!
//! This module defines the error types that can occur while routing location
//! events, talking to the voice backend, and running the ingress server.
//! Every routing failure is local to the event that caused it: the event is
//! dropped, a record is logged, and processing continues.

use crate::backend::{ChannelId, SessionId};
use std::time::Duration;

/// Enumeration of possible server errors.
///
/// Categorizes listener and connection failures of the ingress server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),
}

/// Failures reported by a [`VoiceBackend`](crate::backend::VoiceBackend)
/// implementation or by the client wrapping it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached or the link dropped mid-call
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured deadline
    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend does not know the session id
    #[error("Invalid session id: {0}")]
    InvalidSession(SessionId),

    /// The backend does not know the channel id
    #[error("Invalid channel id: {0}")]
    InvalidChannel(ChannelId),

    /// The backend refused the request for another reason
    #[error("Backend rejected request: {0}")]
    Rejected(String),

    /// The backend answered with something we could not interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No usable virtual server could be selected at startup
    #[error("Server selection failed: {0}")]
    ServerSelection(String),
}

impl BackendError {
    /// Whether a later attempt of the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unavailable(_) | BackendError::Timeout(_))
    }
}

/// Why a single location event did not result in a move.
///
/// None of these are fatal to the service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// The reported location is not in the zone table
    #[error("Unknown zone '{zone}'")]
    UnknownZone { zone: String },

    /// The zone maps to a channel name the backend does not have
    #[error("Channel '{channel}' is not provisioned on the backend")]
    ChannelNotProvisioned { channel: String },

    /// The user has no active voice session
    #[error("No active voice session for user '{username}'")]
    UnknownUser { username: String },

    /// The inbound frame could not be turned into a location event
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// The backend could not be queried or commanded
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A backend call exceeded its deadline
    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend refused the channel change
    #[error("Move rejected by backend: {0}")]
    MoveRejected(String),
}

impl RouteError {
    /// Short stable name used in log records and statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            RouteError::UnknownZone { .. } => "unknown_zone",
            RouteError::ChannelNotProvisioned { .. } => "channel_not_provisioned",
            RouteError::UnknownUser { .. } => "unknown_user",
            RouteError::MalformedEvent(_) => "malformed_event",
            RouteError::BackendUnavailable(_) => "backend_unavailable",
            RouteError::Timeout(_) => "timeout",
            RouteError::MoveRejected(_) => "move_rejected",
        }
    }

    /// Drops that are part of normal operation and only worth a debug record.
    pub fn is_expected(&self) -> bool {
        matches!(self, RouteError::UnknownUser { .. })
    }
}

impl From<BackendError> for RouteError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Timeout(after) => RouteError::Timeout(after),
            BackendError::InvalidSession(_)
            | BackendError::InvalidChannel(_)
            | BackendError::Rejected(_) => RouteError::MoveRejected(err.to_string()),
            BackendError::Unavailable(_)
            | BackendError::Protocol(_)
            | BackendError::ServerSelection(_) => RouteError::BackendUnavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_mapping() {
        assert_eq!(
            RouteError::from(BackendError::Timeout(Duration::from_millis(5))),
            RouteError::Timeout(Duration::from_millis(5))
        );
        assert_eq!(
            RouteError::from(BackendError::InvalidChannel(9)).kind(),
            "move_rejected"
        );
        assert_eq!(
            RouteError::from(BackendError::Unavailable("down".into())).kind(),
            "backend_unavailable"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Unavailable("x".into()).is_transient());
        assert!(BackendError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!BackendError::InvalidSession(1).is_transient());
        assert!(!BackendError::Rejected("no".into()).is_transient());
    }

    #[test]
    fn test_unknown_user_is_expected() {
        assert!(RouteError::UnknownUser { username: "bob".into() }.is_expected());
        assert!(!RouteError::UnknownZone { zone: "Sea".into() }.is_expected());
    }
}
