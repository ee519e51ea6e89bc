//! Per-key rate limiting for abuse-prone actions (password reset and email
//! verification sends).
//!
//! Enforces a cooldown window between attempts plus hourly and daily caps
//! per key (normalized email). The store is in-memory and single-process
//! only: multi-instance deployments need a shared store (e.g. Redis) behind
//! the same interface. Constructed in application state and passed
//! explicitly; never held as module-level state.

use std::collections::HashMap;
use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

/// Maximum distinct keys tracked before the oldest entry is evicted.
/// Bounds memory when an attacker cycles through unique emails.
const MAX_TRACKED_KEYS: usize = 10_000;

/// Limits applied per key
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Minimum seconds between attempts
    pub cooldown_seconds: i64,
    /// Attempts allowed per rolling hour
    pub hourly_cap: u32,
    /// Attempts allowed per rolling day
    pub daily_cap: u32,
}

impl RateLimitConfig {
    pub fn password_reset() -> Self {
        Self {
            cooldown_seconds: 60,
            hourly_cap: 5,
            daily_cap: 10,
        }
    }

    pub fn email_verification() -> Self {
        Self {
            cooldown_seconds: 60,
            hourly_cap: 6,
            daily_cap: 20,
        }
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Seconds until the next attempt may succeed, when denied
    pub retry_after_seconds: Option<i64>,
    pub remaining_hour: u32,
    pub remaining_day: u32,
}

#[derive(Debug, Clone)]
struct KeyUsage {
    last_attempt: OffsetDateTime,
    hour_started: OffsetDateTime,
    hour_count: u32,
    day_started: OffsetDateTime,
    day_count: u32,
}

/// Cooldown + cap limiter over an injected in-memory store
#[derive(Clone)]
pub struct ActionRateLimiter {
    config: RateLimitConfig,
    entries: Arc<RwLock<HashMap<String, KeyUsage>>>,
}

impl ActionRateLimiter {
    pub fn new_in_memory(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Check the key against cooldown and caps, recording the attempt when
    /// allowed
    pub async fn check(&self, key: &str) -> RateLimitResult {
        self.check_at(key, OffsetDateTime::now_utc()).await
    }

    /// Clock-explicit variant of `check`
    pub async fn check_at(&self, key: &str, now: OffsetDateTime) -> RateLimitResult {
        let mut entries = self.entries.write().await;

        let usage = match entries.get_mut(key) {
            Some(usage) => usage,
            None => {
                // Evict oldest entry if at capacity
                if entries.len() >= MAX_TRACKED_KEYS {
                    if let Some(oldest_key) = entries
                        .iter()
                        .min_by_key(|(_, v)| v.last_attempt)
                        .map(|(k, _)| k.clone())
                    {
                        entries.remove(&oldest_key);
                        tracing::debug!("Evicted oldest rate-limit entry to stay under limit");
                    }
                }

                entries.insert(
                    key.to_string(),
                    KeyUsage {
                        last_attempt: now,
                        hour_started: now,
                        hour_count: 1,
                        day_started: now,
                        day_count: 1,
                    },
                );

                return RateLimitResult {
                    allowed: true,
                    retry_after_seconds: None,
                    remaining_hour: self.config.hourly_cap.saturating_sub(1),
                    remaining_day: self.config.daily_cap.saturating_sub(1),
                };
            }
        };

        // Roll the counting windows forward before applying caps
        if now - usage.hour_started >= Duration::hours(1) {
            usage.hour_started = now;
            usage.hour_count = 0;
        }
        if now - usage.day_started >= Duration::days(1) {
            usage.day_started = now;
            usage.day_count = 0;
        }

        let since_last = (now - usage.last_attempt).whole_seconds();
        if since_last < self.config.cooldown_seconds {
            return RateLimitResult {
                allowed: false,
                retry_after_seconds: Some(self.config.cooldown_seconds - since_last),
                remaining_hour: self.config.hourly_cap.saturating_sub(usage.hour_count),
                remaining_day: self.config.daily_cap.saturating_sub(usage.day_count),
            };
        }

        if usage.hour_count >= self.config.hourly_cap {
            let reset_in = (usage.hour_started + Duration::hours(1) - now).whole_seconds();
            return RateLimitResult {
                allowed: false,
                retry_after_seconds: Some(reset_in.max(1)),
                remaining_hour: 0,
                remaining_day: self.config.daily_cap.saturating_sub(usage.day_count),
            };
        }

        if usage.day_count >= self.config.daily_cap {
            let reset_in = (usage.day_started + Duration::days(1) - now).whole_seconds();
            return RateLimitResult {
                allowed: false,
                retry_after_seconds: Some(reset_in.max(1)),
                remaining_hour: self.config.hourly_cap.saturating_sub(usage.hour_count),
                remaining_day: 0,
            };
        }

        usage.last_attempt = now;
        usage.hour_count += 1;
        usage.day_count += 1;

        RateLimitResult {
            allowed: true,
            retry_after_seconds: None,
            remaining_hour: self.config.hourly_cap.saturating_sub(usage.hour_count),
            remaining_day: self.config.daily_cap.saturating_sub(usage.day_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> ActionRateLimiter {
        ActionRateLimiter::new_in_memory(RateLimitConfig {
            cooldown_seconds: 60,
            hourly_cap: 3,
            daily_cap: 5,
        })
    }

    #[tokio::test]
    async fn test_first_attempt_allowed() {
        let limiter = limiter();
        let now = OffsetDateTime::now_utc();

        let result = limiter.check_at("user@example.com", now).await;
        assert!(result.allowed, "First attempt should be allowed");
        assert_eq!(result.remaining_hour, 2);
        assert_eq!(result.remaining_day, 4);
    }

    #[tokio::test]
    async fn test_cooldown_rejects_immediate_retry() {
        let limiter = limiter();
        let now = OffsetDateTime::now_utc();

        limiter.check_at("user@example.com", now).await;
        let retry = limiter
            .check_at("user@example.com", now + Duration::seconds(10))
            .await;

        assert!(!retry.allowed, "Retry inside cooldown should be rejected");
        assert_eq!(retry.retry_after_seconds, Some(50));
    }

    #[tokio::test]
    async fn test_allowed_again_after_cooldown() {
        let limiter = limiter();
        let now = OffsetDateTime::now_utc();

        limiter.check_at("user@example.com", now).await;
        let retry = limiter
            .check_at("user@example.com", now + Duration::seconds(60))
            .await;

        assert!(retry.allowed, "Retry at the cooldown boundary should pass");
    }

    #[tokio::test]
    async fn test_hourly_cap_enforced() {
        let limiter = limiter();
        let now = OffsetDateTime::now_utc();

        // 3 spaced attempts exhaust the hourly cap
        for i in 0..3 {
            let result = limiter
                .check_at("user@example.com", now + Duration::minutes(i * 2))
                .await;
            assert!(result.allowed, "Attempt {} should be allowed", i);
        }

        let fourth = limiter
            .check_at("user@example.com", now + Duration::minutes(10))
            .await;
        assert!(!fourth.allowed, "Attempt over hourly cap should be rejected");
        assert_eq!(fourth.remaining_hour, 0);
        assert!(fourth.retry_after_seconds.is_some());
    }

    #[tokio::test]
    async fn test_hour_window_rolls_over() {
        let limiter = limiter();
        let now = OffsetDateTime::now_utc();

        for i in 0..3 {
            limiter
                .check_at("user@example.com", now + Duration::minutes(i * 2))
                .await;
        }

        let next_hour = limiter
            .check_at("user@example.com", now + Duration::minutes(61))
            .await;
        assert!(next_hour.allowed, "New hour window should reset the cap");
    }

    #[tokio::test]
    async fn test_daily_cap_survives_hour_rollover() {
        let limiter = limiter();
        let now = OffsetDateTime::now_utc();

        // 5 attempts spread over hours exhaust the daily cap
        for i in 0..5i64 {
            let result = limiter
                .check_at("user@example.com", now + Duration::hours(i))
                .await;
            assert!(result.allowed, "Attempt {} should be allowed", i);
        }

        let sixth = limiter
            .check_at("user@example.com", now + Duration::hours(6))
            .await;
        assert!(!sixth.allowed, "Attempt over daily cap should be rejected");
        assert_eq!(sixth.remaining_day, 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_isolated() {
        let limiter = limiter();
        let now = OffsetDateTime::now_utc();

        limiter.check_at("first@example.com", now).await;
        let other = limiter.check_at("second@example.com", now).await;

        assert!(other.allowed, "Keys must not share limits");
    }

    #[tokio::test]
    async fn test_denied_attempt_does_not_consume_quota() {
        let limiter = limiter();
        let now = OffsetDateTime::now_utc();

        limiter.check_at("user@example.com", now).await;
        // Burst of denied retries inside the cooldown
        for i in 1..10 {
            let result = limiter
                .check_at("user@example.com", now + Duration::seconds(i))
                .await;
            assert!(!result.allowed);
        }

        // Quota still has 2 of 3 hourly attempts left
        let after = limiter
            .check_at("user@example.com", now + Duration::seconds(70))
            .await;
        assert!(after.allowed);
        assert_eq!(after.remaining_hour, 1);
    }
}
