//! Routing counters for periodic health reports.

use crate::error::RouteError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Lock-free counters updated by every routing decision.
#[derive(Debug)]
pub struct RouterStats {
    events_received: AtomicU64,
    moves_issued: AtomicU64,
    already_in_channel: AtomicU64,
    unknown_zone: AtomicU64,
    channel_not_provisioned: AtomicU64,
    unknown_user: AtomicU64,
    malformed_event: AtomicU64,
    backend_unavailable: AtomicU64,
    timeout: AtomicU64,
    move_rejected: AtomicU64,
    start_time: Instant,
}

/// Point-in-time copy of [`RouterStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub events_received: u64,
    pub moves_issued: u64,
    pub already_in_channel: u64,
    pub unknown_zone: u64,
    pub channel_not_provisioned: u64,
    pub unknown_user: u64,
    pub malformed_event: u64,
    pub backend_unavailable: u64,
    pub timeout: u64,
    pub move_rejected: u64,
    pub uptime_secs: u64,
}

impl StatsSnapshot {
    /// Events that ended in an error of any kind.
    pub fn dropped(&self) -> u64 {
        self.unknown_zone
            + self.channel_not_provisioned
            + self.unknown_user
            + self.malformed_event
            + self.backend_unavailable
            + self.timeout
            + self.move_rejected
    }
}

impl Default for RouterStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterStats {
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            moves_issued: AtomicU64::new(0),
            already_in_channel: AtomicU64::new(0),
            unknown_zone: AtomicU64::new(0),
            channel_not_provisioned: AtomicU64::new(0),
            unknown_user: AtomicU64::new(0),
            malformed_event: AtomicU64::new(0),
            backend_unavailable: AtomicU64::new(0),
            timeout: AtomicU64::new(0),
            move_rejected: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_moved(&self) {
        self.moves_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_already_in_channel(&self) {
        self.already_in_channel.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, error: &RouteError) {
        let counter = match error {
            RouteError::UnknownZone { .. } => &self.unknown_zone,
            RouteError::ChannelNotProvisioned { .. } => &self.channel_not_provisioned,
            RouteError::UnknownUser { .. } => &self.unknown_user,
            RouteError::MalformedEvent(_) => &self.malformed_event,
            RouteError::BackendUnavailable(_) => &self.backend_unavailable,
            RouteError::Timeout(_) => &self.timeout,
            RouteError::MoveRejected(_) => &self.move_rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            moves_issued: self.moves_issued.load(Ordering::Relaxed),
            already_in_channel: self.already_in_channel.load(Ordering::Relaxed),
            unknown_zone: self.unknown_zone.load(Ordering::Relaxed),
            channel_not_provisioned: self.channel_not_provisioned.load(Ordering::Relaxed),
            unknown_user: self.unknown_user.load(Ordering::Relaxed),
            malformed_event: self.malformed_event.load(Ordering::Relaxed),
            backend_unavailable: self.backend_unavailable.load(Ordering::Relaxed),
            timeout: self.timeout.load(Ordering::Relaxed),
            move_rejected: self.move_rejected.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = RouterStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_moved();
        stats.record_error(&RouteError::UnknownZone { zone: "Sea".into() });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.events_received, 2);
        assert_eq!(snapshot.moves_issued, 1);
        assert_eq!(snapshot.unknown_zone, 1);
        assert_eq!(snapshot.dropped(), 1);
    }
}
