//! Result caching
//!
//! One [`Cache`] trait with a process-local backend and a shared Redis
//! backend. Backends never surface errors: a failed read is a miss and a
//! failed write is dropped.

mod local;
mod remote;
#[cfg(test)]
pub(crate) mod testing;

pub use local::LocalCache;
pub use remote::RedisCache;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Byte-oriented key/value store with per-entry TTL
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` for `ttl`. A zero TTL means the backend default.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);

    fn backend(&self) -> &'static str;
}

/// Read and decode a JSON value. Undecodable entries count as misses.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    let bytes = cache.get(key).await?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Discarding undecodable cache entry {}: {}", key, e);
            None
        }
    }
}

/// Encode and store a JSON value
pub async fn set_json<T: Serialize>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration) {
    match serde_json::to_vec(value) {
        Ok(bytes) => cache.set(key, bytes, ttl).await,
        Err(e) => warn!("Failed to encode cache entry {}: {}", key, e),
    }
}

/// Build a namespaced key from the canonical parts of a request
pub fn cache_key(namespace: &str, parts: &[&str]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }

    format!("{}:{:x}", namespace, hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Page {
        ids: Vec<i64>,
    }

    #[test]
    fn test_cache_key_is_stable() {
        let a = cache_key("search", &["rust", "video", "1"]);
        let b = cache_key("search", &["rust", "video", "1"]);
        assert_eq!(a, b);
        assert!(a.starts_with("search:"));
    }

    #[test]
    fn test_cache_key_separates_parts() {
        assert_ne!(
            cache_key("search", &["ab", "c"]),
            cache_key("search", &["a", "bc"])
        );
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let cache = LocalCache::new(Duration::from_secs(60), 100, Duration::from_secs(60));
        let page = Page { ids: vec![3, 1, 2] };
        set_json(&cache, "page", &page, Duration::ZERO).await;
        assert_eq!(get_json::<Page>(&cache, "page").await, Some(page));

        cache.set("broken", b"{not json".to_vec(), Duration::ZERO).await;
        assert_eq!(get_json::<Page>(&cache, "broken").await, None);
    }
}
