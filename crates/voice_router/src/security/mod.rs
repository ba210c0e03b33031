//! Ingress protection for location frames.

use crate::config::SecurityConfig;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

pub mod rate_limiter;

use rate_limiter::RateLimiter;

/// Per-IP guard applied to every inbound frame before it is parsed
#[derive(Debug)]
pub struct SecurityManager {
    config: SecurityConfig,
    rate_limiter: RateLimiter,
}

impl SecurityManager {
    /// Creates a new security manager with the given configuration
    pub fn new(config: SecurityConfig) -> Self {
        let rate_limiter =
            RateLimiter::new(config.max_messages_per_minute, Duration::from_secs(60));
        Self {
            config,
            rate_limiter,
        }
    }

    /// Validates an incoming frame from `ip`
    pub async fn validate_frame(&self, ip: IpAddr, frame: &[u8]) -> Result<(), SecurityError> {
        if frame.len() > self.config.max_message_size {
            return Err(SecurityError::MessageTooLarge(frame.len()));
        }

        if self.config.enable_rate_limiting && !self.rate_limiter.check_rate_limit(ip).await {
            return Err(SecurityError::RateLimitExceeded(ip));
        }

        Ok(())
    }

    /// Forgets IPs that have been quiet for an hour
    pub async fn cleanup(&self) {
        self.rate_limiter
            .cleanup_old_entries(Duration::from_secs(3600))
            .await;
    }

    /// Gets current security statistics
    pub async fn get_stats(&self) -> SecurityStats {
        SecurityStats {
            tracked_ips: self.rate_limiter.tracked_ips().await,
            rate_limited_frames: self.rate_limiter.blocked_count(),
        }
    }
}

/// Security-related statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityStats {
    pub tracked_ips: usize,
    pub rate_limited_frames: u64,
}

/// Security-related errors
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Rate limit exceeded for IP {0}")]
    RateLimitExceeded(IpAddr),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let manager = SecurityManager::new(SecurityConfig {
            max_message_size: 8,
            ..Default::default()
        });
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(manager.validate_frame(ip, b"{}").await.is_ok());
        assert!(matches!(
            manager.validate_frame(ip, b"0123456789").await,
            Err(SecurityError::MessageTooLarge(10))
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_can_be_disabled() {
        let manager = SecurityManager::new(SecurityConfig {
            enable_rate_limiting: false,
            max_messages_per_minute: 1,
            ..Default::default()
        });
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        for _ in 0..5 {
            assert!(manager.validate_frame(ip, b"{}").await.is_ok());
        }
        assert_eq!(manager.get_stats().await.rate_limited_frames, 0);
    }

    #[tokio::test]
    async fn test_rate_limit_enforced() {
        let manager = SecurityManager::new(SecurityConfig {
            max_messages_per_minute: 2,
            ..Default::default()
        });
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(manager.validate_frame(ip, b"{}").await.is_ok());
        assert!(manager.validate_frame(ip, b"{}").await.is_ok());
        assert!(matches!(
            manager.validate_frame(ip, b"{}").await,
            Err(SecurityError::RateLimitExceeded(_))
        ));
    }
}
