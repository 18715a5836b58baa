//! Inbound per-client limiters

use async_trait::async_trait;
use chrono::Utc;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::StateInformationMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use redis::aio::ConnectionManager;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::warn;

/// Outcome of one inbound check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the caller regains quota
    pub reset_at: i64,
}

impl RateDecision {
    /// Decision used when the backing store cannot answer
    pub fn fail_open(limit: u32, window: Duration) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit,
            reset_at: Utc::now().timestamp() + window.as_secs() as i64,
        }
    }

    /// Seconds until reset, never negative
    pub fn retry_after(&self) -> u64 {
        (self.reset_at - Utc::now().timestamp()).max(0) as u64
    }
}

/// Per-key request admission
#[async_trait]
pub trait InboundLimiter: Send + Sync {
    async fn check(&self, key: &str) -> RateDecision;

    fn limit(&self) -> u32;
}

/// Sliding-window counter over a Redis sorted set scored by timestamp
pub struct RedisWindowLimiter {
    redis: ConnectionManager,
    limit: u32,
    window: Duration,
    op_timeout: Duration,
}

impl RedisWindowLimiter {
    pub fn new(redis: ConnectionManager, limit: u32, window: Duration, op_timeout: Duration) -> Self {
        Self {
            redis,
            limit: limit.max(1),
            window,
            op_timeout,
        }
    }

    async fn record(&self, key: &str) -> redis::RedisResult<RateDecision> {
        let mut conn = self.redis.clone();
        let key = format!("ratelimit:{}", key);
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = self.window.as_millis() as i64;
        let window_start = now_ms - window_ms;
        let member = format!("{}-{}", now_ms, uuid::Uuid::new_v4());

        let (count, oldest): (u32, Vec<(String, f64)>) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg(0)
            .arg(window_start)
            .ignore()
            .cmd("ZCARD")
            .arg(&key)
            .cmd("ZADD")
            .arg(&key)
            .arg(now_ms)
            .arg(&member)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.window.as_secs() + 1)
            .ignore()
            .cmd("ZRANGE")
            .arg(&key)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;

        let oldest_ms = oldest
            .first()
            .map(|(_, score)| *score as i64)
            .unwrap_or(now_ms);
        let reset_at = (oldest_ms + window_ms) / 1000;
        let allowed = count < self.limit;
        let remaining = if allowed { self.limit - count - 1 } else { 0 };

        Ok(RateDecision {
            allowed,
            limit: self.limit,
            remaining,
            reset_at,
        })
    }
}

#[async_trait]
impl InboundLimiter for RedisWindowLimiter {
    async fn check(&self, key: &str) -> RateDecision {
        match tokio::time::timeout(self.op_timeout, self.record(key)).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                warn!("Rate limit store error, allowing request: {}", e);
                RateDecision::fail_open(self.limit, self.window)
            }
            Err(_) => {
                warn!(
                    "Rate limit store timed out after {:?}, allowing request",
                    self.op_timeout
                );
                RateDecision::fail_open(self.limit, self.window)
            }
        }
    }

    fn limit(&self) -> u32 {
        self.limit
    }
}

type KeyedLimiter = RateLimiter<
    String,
    DefaultKeyedStateStore<String>,
    DefaultClock,
    StateInformationMiddleware,
>;

/// In-process keyed limiter for deployments without Redis
pub struct LocalKeyedLimiter {
    limiter: KeyedLimiter,
    clock: DefaultClock,
    limit: u32,
    window: Duration,
}

impl LocalKeyedLimiter {
    pub fn per_minute(limit: u32) -> Self {
        let limit = limit.max(1);
        let quota = Quota::per_minute(NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::keyed(quota).with_middleware::<StateInformationMiddleware>(),
            clock: DefaultClock::default(),
            limit,
            window: Duration::from_secs(60),
        }
    }
}

#[async_trait]
impl InboundLimiter for LocalKeyedLimiter {
    async fn check(&self, key: &str) -> RateDecision {
        let now = Utc::now().timestamp();
        match self.limiter.check_key(&key.to_string()) {
            Ok(snapshot) => RateDecision {
                allowed: true,
                limit: self.limit,
                remaining: snapshot.remaining_burst_capacity(),
                reset_at: now + self.window.as_secs() as i64,
            },
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                RateDecision {
                    allowed: false,
                    limit: self.limit,
                    remaining: 0,
                    reset_at: now + wait.as_secs().max(1) as i64,
                }
            }
        }
    }

    fn limit(&self) -> u32 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::{fake_redis, FakeRedis};

    #[tokio::test]
    async fn test_local_limiter_denies_after_quota() {
        let limiter = LocalKeyedLimiter::per_minute(3);
        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check("10.0.0.1").await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
            assert_eq!(decision.limit, 3);
        }
        let denied = limiter.check("10.0.0.1").await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after() >= 1);
    }

    #[tokio::test]
    async fn test_local_limiter_keys_are_independent() {
        let limiter = LocalKeyedLimiter::per_minute(1);
        assert!(limiter.check("a").await.allowed);
        assert!(!limiter.check("a").await.allowed);
        assert!(limiter.check("b").await.allowed);
    }

    #[tokio::test]
    async fn test_redis_error_fails_open() {
        let limiter = RedisWindowLimiter::new(
            fake_redis(FakeRedis::Failing).await,
            10,
            Duration::from_secs(60),
            Duration::from_secs(2),
        );
        for _ in 0..12 {
            let decision = limiter.check("10.0.0.1").await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 10);
        }
    }

    #[tokio::test]
    async fn test_redis_timeout_fails_open() {
        let limiter = RedisWindowLimiter::new(
            fake_redis(FakeRedis::Stalled).await,
            10,
            Duration::from_secs(60),
            Duration::from_millis(50),
        );
        let started = std::time::Instant::now();
        let decision = limiter.check("10.0.0.1").await;
        assert!(decision.allowed);
        assert_eq!(decision.limit, 10);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_fail_open_allows() {
        let decision = RateDecision::fail_open(60, Duration::from_secs(60));
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 60);
        assert!(decision.retry_after() <= 60);
    }
}
