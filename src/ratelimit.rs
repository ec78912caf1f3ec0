//! Per-client vote cooldown
//!
//! The limiter only advises: checking never records anything. Callers
//! record a submission once it has actually been accepted, so repeated
//! checks from rapid double clicks do not tighten the limit.

use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

/// Cooldown gate keyed by an opaque client identifier
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Map of identifier to last accepted submission
    last_accepted: Arc<RwLock<HashMap<String, Instant>>>,
    cooldown: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_accepted: Arc::new(RwLock::new(HashMap::new())),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Check if a submission would be allowed right now
    pub async fn can_submit(&self, key: &str) -> bool {
        self.can_submit_at(key, Instant::now()).await
    }

    pub async fn can_submit_at(&self, key: &str, now: Instant) -> bool {
        self.remaining_time_at(key, now).await.is_zero()
    }

    /// Time until the identifier may submit again (zero if allowed)
    pub async fn remaining_time(&self, key: &str) -> Duration {
        self.remaining_time_at(key, Instant::now()).await
    }

    pub async fn remaining_time_at(&self, key: &str, now: Instant) -> Duration {
        match self.last_accepted.read().await.get(key) {
            Some(last) => self
                .cooldown
                .saturating_sub(now.saturating_duration_since(*last)),
            None => Duration::ZERO,
        }
    }

    /// Record an accepted submission
    pub async fn record(&self, key: &str) {
        self.record_at(key, Instant::now()).await
    }

    pub async fn record_at(&self, key: &str, now: Instant) {
        self.last_accepted.write().await.insert(key.to_string(), now);
    }
}

/// Derive the opaque rate limit identifier for a browser client.
///
/// Hashes what every request exposes anyway (user agent and room), so
/// a participant who rejoins from the same browser keeps their cooldown.
pub fn client_fingerprint(user_agent: &str, room_code: &str) -> String {
    let digest = Sha256::digest(format!("{}|{}", user_agent, room_code).as_bytes());
    hex::encode(&digest[..8])
}

/// Whole seconds to show in a "please wait" message (rounded up)
pub fn wait_seconds(remaining: Duration) -> u64 {
    remaining.as_millis().div_ceil(1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_submission_allowed() {
        let limiter = RateLimiter::default();
        assert!(limiter.can_submit("client-a").await);
        assert_eq!(limiter.remaining_time("client-a").await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_check_does_not_record() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let t0 = Instant::now();

        for _ in 0..3 {
            assert!(limiter.can_submit_at("client-a", t0).await);
        }
    }

    #[tokio::test]
    async fn test_second_submission_within_cooldown_blocked() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let t0 = Instant::now();

        limiter.record_at("client-a", t0).await;

        let t2 = t0 + Duration::from_secs(2);
        assert!(!limiter.can_submit_at("client-a", t2).await);
        assert_eq!(
            limiter.remaining_time_at("client-a", t2).await,
            Duration::from_millis(3000)
        );
    }

    #[tokio::test]
    async fn test_remaining_time_decreases_to_zero_at_boundary() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let t0 = Instant::now();
        limiter.record_at("client-a", t0).await;

        let mut previous = limiter.remaining_time_at("client-a", t0).await;
        assert_eq!(previous, Duration::from_secs(5));

        for ms in [1000, 2500, 4000, 4999] {
            let remaining = limiter
                .remaining_time_at("client-a", t0 + Duration::from_millis(ms))
                .await;
            assert!(remaining < previous);
            previous = remaining;
        }

        let boundary = t0 + Duration::from_secs(5);
        assert_eq!(
            limiter.remaining_time_at("client-a", boundary).await,
            Duration::ZERO
        );
        assert!(limiter.can_submit_at("client-a", boundary).await);
    }

    #[tokio::test]
    async fn test_cooldown_is_per_identifier() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let t0 = Instant::now();
        limiter.record_at("client-a", t0).await;

        let t6 = t0 + Duration::from_secs(6);
        assert!(limiter.can_submit_at("client-b", t0).await);
        assert!(limiter.can_submit_at("client-b", t6).await);
        assert!(limiter.can_submit_at("client-a", t6).await);
    }

    #[test]
    fn test_fingerprint_is_stable_and_scoped_to_room() {
        let ua = "Mozilla/5.0 (X11; Linux x86_64)";
        assert_eq!(client_fingerprint(ua, "ABC123"), client_fingerprint(ua, "ABC123"));
        assert_ne!(client_fingerprint(ua, "ABC123"), client_fingerprint(ua, "XYZ789"));
        assert_eq!(client_fingerprint(ua, "ABC123").len(), 16);
    }

    #[test]
    fn test_wait_seconds_rounds_up() {
        assert_eq!(wait_seconds(Duration::from_millis(3000)), 3);
        assert_eq!(wait_seconds(Duration::from_millis(2001)), 3);
        assert_eq!(wait_seconds(Duration::ZERO), 0);
    }
}
