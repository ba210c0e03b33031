//! Move execution against the backend.
//!
//! A failed move is terminal for its intent. The next location report for
//! the same user produces a fresh decision, which acts as a natural retry.
//! An optional bounded retry covers transient transport failures only.

use crate::backend::{BackendClient, ChannelId, SessionId};
use crate::error::RouteError;
use std::time::Duration;
use tracing::{debug, warn};

/// A single channel change decided by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveIntent {
    pub session: SessionId,
    pub channel: ChannelId,
    /// For log records only
    pub username: String,
    /// For log records only
    pub channel_name: String,
}

/// Bounded retry settings for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub retries: u32,
    /// Delay before the first retry, doubled after each retry
    pub backoff: Duration,
}

impl RetryPolicy {
    /// One attempt, no retry.
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Issues `setState` commands for move intents.
#[derive(Debug, Clone)]
pub struct MoveExecutor {
    client: BackendClient,
    retry: RetryPolicy,
}

impl MoveExecutor {
    pub fn new(client: BackendClient) -> Self {
        Self::with_retry(client, RetryPolicy::none())
    }

    pub fn with_retry(client: BackendClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Moves the session into the target channel.
    ///
    /// # Errors
    ///
    /// * `MoveRejected` - the backend refused the session or channel id
    /// * `BackendUnavailable` - the command could not be delivered
    /// * `Timeout` - the command did not complete in time
    pub async fn execute(&self, intent: &MoveIntent) -> Result<(), RouteError> {
        let mut backoff = self.retry.backoff;
        let mut attempt = 0;
        loop {
            match self.client.set_channel(intent.session, intent.channel).await {
                Ok(()) => {
                    debug!(
                        "setState ok: session {} → channel {} (attempt {})",
                        intent.session,
                        intent.channel,
                        attempt + 1
                    );
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.retry.retries => {
                    attempt += 1;
                    warn!(
                        "⚠️ Move of '{}' failed ({}), retry {}/{} in {:?}",
                        intent.username, e, attempt, self.retry.retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
