//! In-process cache backed by moka

use super::Cache;
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Clone)]
struct Entry {
    bytes: Arc<[u8]>,
    ttl: Duration,
}

/// Expires each entry after its own TTL
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Local cache with lazy expiry on read and a periodic sweep
pub struct LocalCache {
    cache: MokaCache<String, Entry>,
    default_ttl: Duration,
    sweeper: JoinHandle<()>,
}

impl LocalCache {
    /// Must be called from within a tokio runtime; the sweep runs as a task.
    pub fn new(default_ttl: Duration, max_capacity: u64, sweep_interval: Duration) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        let swept = cache.clone();
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval.max(Duration::from_secs(1)));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                swept.run_pending_tasks().await;
                debug!("Cache sweep done, {} entries live", swept.entry_count());
            }
        });

        Self {
            cache,
            default_ttl,
            sweeper,
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Drop for LocalCache {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

#[async_trait]
impl Cache for LocalCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.cache.get(key).await.map(|entry| entry.bytes.to_vec())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let entry = Entry {
            bytes: value.into(),
            ttl,
        };
        self.cache.insert(key.to_string(), entry).await;
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}
