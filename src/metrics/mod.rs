//! Metrics collection module
//!
//! Tracks provider sync performance, search volume and degradations.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const RESPONSE_TIME_WINDOW: usize = 100;

/// Process-wide counters, shared behind an `Arc`
pub struct Metrics {
    total_searches: AtomicU64,
    search_cache_hits: AtomicU64,
    /// Searches answered without a total because the count ran out of time
    degraded_counts: AtomicU64,
    search_timeouts: AtomicU64,
    /// Sync durations per provider (rolling, in ms)
    sync_times: RwLock<HashMap<String, Vec<u64>>>,
    sync_errors: RwLock<HashMap<String, u64>>,
    sync_successes: RwLock<HashMap<String, u64>>,
    items_stored: RwLock<HashMap<String, u64>>,
    items_failed: RwLock<HashMap<String, u64>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn count(lock: &RwLock<HashMap<String, u64>>, key: &str) -> u64 {
    read(lock).get(key).copied().unwrap_or(0)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            total_searches: AtomicU64::new(0),
            search_cache_hits: AtomicU64::new(0),
            degraded_counts: AtomicU64::new(0),
            search_timeouts: AtomicU64::new(0),
            sync_times: RwLock::new(HashMap::new()),
            sync_errors: RwLock::new(HashMap::new()),
            sync_successes: RwLock::new(HashMap::new()),
            items_stored: RwLock::new(HashMap::new()),
            items_failed: RwLock::new(HashMap::new()),
        }
    }

    pub fn inc_search(&self) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hit(&self) {
        self.search_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_degraded_count(&self) {
        self.degraded_counts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_search_timeout(&self) {
        self.search_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed provider sync
    pub fn record_sync_success(&self, provider: &str, time_ms: u64, stored: u64, failed: u64) {
        *write(&self.sync_successes)
            .entry(provider.to_string())
            .or_insert(0) += 1;
        *write(&self.items_stored)
            .entry(provider.to_string())
            .or_insert(0) += stored;
        *write(&self.items_failed)
            .entry(provider.to_string())
            .or_insert(0) += failed;
        self.record_sync_time(provider, time_ms);
    }

    pub fn record_sync_error(&self, provider: &str, time_ms: u64) {
        *write(&self.sync_errors)
            .entry(provider.to_string())
            .or_insert(0) += 1;
        self.record_sync_time(provider, time_ms);
    }

    fn record_sync_time(&self, provider: &str, time_ms: u64) {
        let mut times = write(&self.sync_times);
        let entry = times.entry(provider.to_string()).or_default();

        if entry.len() >= RESPONSE_TIME_WINDOW {
            entry.remove(0);
        }
        entry.push(time_ms);
    }

    pub fn total_searches(&self) -> u64 {
        self.total_searches.load(Ordering::Relaxed)
    }

    pub fn avg_sync_time(&self, provider: &str) -> Option<u64> {
        let times = read(&self.sync_times);
        times.get(provider).and_then(|t| {
            if t.is_empty() {
                None
            } else {
                Some(t.iter().sum::<u64>() / t.len() as u64)
            }
        })
    }

    /// Percentage of syncs that succeeded; 100 before the first attempt
    pub fn reliability(&self, provider: &str) -> f64 {
        let error_count = count(&self.sync_errors, provider);
        let success_count = count(&self.sync_successes, provider);

        let total = error_count + success_count;
        if total == 0 {
            100.0
        } else {
            (success_count as f64 / total as f64) * 100.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut names: Vec<String> = read(&self.sync_successes).keys().cloned().collect();
        names.extend(read(&self.sync_errors).keys().cloned());
        names.sort();
        names.dedup();

        let providers = names
            .into_iter()
            .map(|name| {
                let syncs = count(&self.sync_successes, &name);
                let failures = count(&self.sync_errors, &name);
                let stats = ProviderSyncStats {
                    syncs,
                    failures,
                    items_stored: count(&self.items_stored, &name),
                    items_failed: count(&self.items_failed, &name),
                    avg_sync_ms: self.avg_sync_time(&name),
                    reliability: self.reliability(&name),
                };
                (name, stats)
            })
            .collect();

        MetricsSnapshot {
            searches: self.total_searches(),
            cache_hits: self.search_cache_hits.load(Ordering::Relaxed),
            degraded_counts: self.degraded_counts.load(Ordering::Relaxed),
            search_timeouts: self.search_timeouts.load(Ordering::Relaxed),
            providers,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSyncStats {
    pub syncs: u64,
    pub failures: u64,
    pub items_stored: u64,
    pub items_failed: u64,
    pub avg_sync_ms: Option<u64>,
    pub reliability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub searches: u64,
    pub cache_hits: u64,
    pub degraded_counts: u64,
    pub search_timeouts: u64,
    pub providers: BTreeMap<String, ProviderSyncStats>,
}
