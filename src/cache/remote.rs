//! Shared cache backed by Redis

use super::Cache;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, warn};

pub struct RedisCache {
    redis: ConnectionManager,
    default_ttl: Duration,
    op_timeout: Duration,
    prefix: String,
}

impl RedisCache {
    pub fn new(redis: ConnectionManager, default_ttl: Duration, op_timeout: Duration) -> Self {
        Self {
            redis,
            default_ttl,
            op_timeout,
            prefix: "aggregator:".to_string(),
        }
    }

    /// Open a managed connection to `url`
    pub async fn connect(url: &str, default_ttl: Duration, op_timeout: Duration) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self::new(redis, default_ttl, op_timeout))
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.redis.clone();
        let key = self.key(key);
        let read = conn.get::<_, Option<Vec<u8>>>(&key);
        match tokio::time::timeout(self.op_timeout, read).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!("Redis cache get failed for {}: {}", key, e);
                None
            }
            Err(_) => {
                debug!("Redis cache get timed out for {}", key);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let mut conn = self.redis.clone();
        let key = self.key(key);
        let write = conn.set_ex::<_, _, ()>(&key, value, ttl.as_secs().max(1));
        match tokio::time::timeout(self.op_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Redis cache set failed for {}: {}", key, e),
            Err(_) => debug!("Redis cache set timed out for {}", key),
        }
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::{fake_redis, FakeRedis};
    use std::time::Instant;

    #[tokio::test]
    async fn test_error_reply_reads_as_miss() {
        let cache = RedisCache::new(
            fake_redis(FakeRedis::Failing).await,
            Duration::from_secs(60),
            Duration::from_secs(2),
        );
        cache.set("k", b"v".to_vec(), Duration::ZERO).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_stalled_server_reads_as_miss() {
        let cache = RedisCache::new(
            fake_redis(FakeRedis::Stalled).await,
            Duration::from_secs(60),
            Duration::from_millis(50),
        );
        let started = Instant::now();
        cache.set("k", b"v".to_vec(), Duration::from_secs(5)).await;
        assert_eq!(cache.get("k").await, None);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
