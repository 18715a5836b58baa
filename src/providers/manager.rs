//! Provider registry and sync orchestration

use super::traits::ProviderAdapter;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::model::{Content, ContentDraft, ProviderSpec};
use crate::ratelimit::TokenBucket;
use crate::scoring;
use crate::storage::{ContentStore, ProviderStore};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Write every configured provider to the store, updating existing rows by name
pub async fn ensure_providers(store: &dyn ProviderStore, specs: &[ProviderSpec]) -> Result<()> {
    for spec in specs {
        let provider = store
            .save_provider(spec)
            .await
            .map_err(|e| Error::storage("save provider", e))?;
        debug!(
            "Provider {} ready (id {}, {} req/min)",
            provider.name, provider.id, provider.rate_limit_per_minute
        );
    }
    Ok(())
}

/// Outcome of one provider sync
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub provider: String,
    /// Items decoded from the payload
    pub fetched: usize,
    pub stored: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

#[derive(Clone)]
struct Registered {
    adapter: Arc<dyn ProviderAdapter>,
    provider_id: i64,
    limiter: Arc<TokenBucket>,
}

/// Everything one sync task needs, owned so it can run on its own task
struct SyncJob {
    entry: Registered,
    providers: Arc<dyn ProviderStore>,
    contents: Arc<dyn ContentStore>,
    metrics: Arc<Metrics>,
}

impl SyncJob {
    async fn run(self) -> Result<SyncReport> {
        let name = self.entry.adapter.name().to_string();
        let start = Instant::now();

        self.entry.limiter.acquire().await;
        debug!("Fetching {} from {}", name, self.entry.adapter.url());

        let drafts = match self.entry.adapter.fetch().await {
            Ok(drafts) => drafts,
            Err(source) => {
                let elapsed = start.elapsed().as_millis() as u64;
                self.metrics.record_sync_error(&name, elapsed);
                return Err(Error::Upstream {
                    provider: name,
                    source,
                });
            }
        };

        let now = Utc::now();
        let mut report = SyncReport {
            provider: name.clone(),
            fetched: drafts.len(),
            stored: 0,
            failed: 0,
            duration_ms: 0,
        };

        for draft in &drafts {
            match self.store_item(draft, now).await {
                Ok(content) => {
                    debug!("{}: stored {} as {}", name, draft.external_id, content.id);
                    report.stored += 1;
                }
                Err(e) => {
                    warn!("{}: failed to store {}: {}", name, draft.external_id, e);
                    report.failed += 1;
                }
            }
        }

        self.providers
            .mark_fetched(self.entry.provider_id, Utc::now())
            .await
            .map_err(|e| Error::storage("mark provider fetched", e))?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        self.metrics.record_sync_success(
            &name,
            report.duration_ms,
            report.stored as u64,
            report.failed as u64,
        );
        info!(
            "Synced {}: {} fetched, {} stored, {} failed in {}ms",
            name, report.fetched, report.stored, report.failed, report.duration_ms
        );
        Ok(report)
    }

    /// Create or update by (provider, external id), then replace the tag set
    async fn store_item(&self, draft: &ContentDraft, now: DateTime<Utc>) -> Result<Content> {
        draft.validate().map_err(Error::Validation)?;
        let provider_id = self.entry.provider_id;
        let score = scoring::score_at(&draft.metrics, draft.published_at, now);

        let existing = self
            .contents
            .find_by_external(provider_id, &draft.external_id)
            .await
            .map_err(|e| Error::storage("find content", e))?;

        let content = match existing {
            Some(current) => self
                .contents
                .update_content(current.id, draft, score)
                .await
                .map_err(|e| Error::storage("update content", e))?,
            None => match self.contents.insert_content(provider_id, draft, score).await {
                Ok(content) => content,
                // another sync of the same provider inserted it first
                Err(insert_err) => match self
                    .contents
                    .find_by_external(provider_id, &draft.external_id)
                    .await
                {
                    Ok(Some(current)) => self
                        .contents
                        .update_content(current.id, draft, score)
                        .await
                        .map_err(|e| Error::storage("update content", e))?,
                    _ => return Err(Error::storage("insert content", insert_err)),
                },
            },
        };

        self.contents
            .replace_tags(content.id, &draft.unique_tags())
            .await
            .map_err(|e| Error::storage("replace tags", e))?;
        Ok(content)
    }
}

/// Registry of provider adapters, each paired with its own fetch limiter
pub struct ProviderManager {
    providers: Arc<dyn ProviderStore>,
    contents: Arc<dyn ContentStore>,
    registry: RwLock<HashMap<String, Registered>>,
    metrics: Arc<Metrics>,
}

impl ProviderManager {
    pub fn new(
        providers: Arc<dyn ProviderStore>,
        contents: Arc<dyn ContentStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            providers,
            contents,
            registry: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Register an adapter. The limiter is sized from the stored provider row;
    /// a provider with no row is created with the default rate.
    pub async fn register(&self, adapter: Arc<dyn ProviderAdapter>) -> Result<()> {
        let name = adapter.name().to_string();
        let stored = self
            .providers
            .provider_by_name(&name)
            .await
            .map_err(|e| Error::storage("load provider", e))?;

        let provider = match stored {
            Some(provider) => provider,
            None => {
                let spec = ProviderSpec::new(&name, adapter.url(), adapter.format());
                self.providers
                    .save_provider(&spec)
                    .await
                    .map_err(|e| Error::storage("save provider", e))?
            }
        };

        info!(
            "Registered provider {} ({}, {} req/min)",
            name,
            adapter.format(),
            provider.rate_limit_per_minute
        );
        let entry = Registered {
            adapter,
            provider_id: provider.id,
            limiter: Arc::new(TokenBucket::new(provider.rate_limit_per_minute)),
        };
        self.registry.write().await.insert(name, entry);
        Ok(())
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    fn job(&self, entry: Registered) -> SyncJob {
        SyncJob {
            entry,
            providers: self.providers.clone(),
            contents: self.contents.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Sync every registered provider concurrently, one task each.
    ///
    /// Every provider is attempted once. If any fails, the others still
    /// complete and an aggregate error names the failures.
    pub async fn fetch_all(&self) -> Result<Vec<SyncReport>> {
        let entries: Vec<Registered> = self.registry.read().await.values().cloned().collect();
        let attempted = entries.len();
        info!("Syncing {} providers", attempted);

        let handles: Vec<_> = entries
            .into_iter()
            .map(|entry| {
                let name = entry.adapter.name().to_string();
                let job = self.job(entry);
                (name, tokio::spawn(job.run()))
            })
            .collect();

        let (names, tasks): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        let outcomes = join_all(tasks).await;

        let mut reports = Vec::with_capacity(attempted);
        let mut failed = Vec::new();
        for (name, outcome) in names.into_iter().zip(outcomes) {
            match outcome {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => {
                    error!("Sync of {} failed: {}", name, e);
                    failed.push(name);
                }
                Err(join_err) => {
                    error!("Sync task for {} aborted: {}", name, join_err);
                    failed.push(name);
                }
            }
        }

        if failed.is_empty() {
            reports.sort_by(|a, b| a.provider.cmp(&b.provider));
            Ok(reports)
        } else {
            failed.sort();
            Err(Error::ProvidersFailed { failed, attempted })
        }
    }

    /// Sync a single provider by name
    pub async fn fetch_one(&self, name: &str) -> Result<SyncReport> {
        let entry = self
            .registry
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("provider", name))?;
        self.job(entry).run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::FetchError;
    use crate::model::{ContentType, Metrics as ItemMetrics, ProviderFormat};
    use crate::network::HttpClient;
    use crate::storage::{MemoryStore, SearchStore};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Serves canned drafts, or fails, without touching the network
    struct StaticAdapter {
        name: String,
        client: HttpClient,
        drafts: Mutex<Vec<ContentDraft>>,
        fail: bool,
    }

    impl StaticAdapter {
        fn new(name: &str, drafts: Vec<ContentDraft>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                client: HttpClient::new().unwrap(),
                drafts: Mutex::new(drafts),
                fail: false,
            })
        }

        fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                client: HttpClient::new().unwrap(),
                drafts: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn replace(&self, drafts: Vec<ContentDraft>) {
            *self.drafts.lock().unwrap() = drafts;
        }
    }

    #[async_trait]
    impl ProviderAdapter for StaticAdapter {
        fn name(&self) -> &str {
            &self.name
        }

        fn url(&self) -> &str {
            "http://static.test/feed"
        }

        fn format(&self) -> ProviderFormat {
            ProviderFormat::Json
        }

        fn client(&self) -> &HttpClient {
            &self.client
        }

        fn parse(&self, _body: &str) -> std::result::Result<Vec<ContentDraft>, FetchError> {
            Ok(self.drafts.lock().unwrap().clone())
        }

        async fn fetch(&self) -> std::result::Result<Vec<ContentDraft>, FetchError> {
            if self.fail {
                return Err(FetchError::Status(503));
            }
            self.parse("")
        }
    }

    fn video(id: &str, views: u64, tags: &[&str]) -> ContentDraft {
        ContentDraft {
            external_id: id.to_string(),
            title: format!("video {}", id),
            metrics: ItemMetrics::Video {
                views,
                likes: 10,
                duration_seconds: Some(60),
            },
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn manager(store: &Arc<MemoryStore>) -> ProviderManager {
        ProviderManager::new(store.clone(), store.clone(), Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn test_resync_updates_in_place() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        let adapter = StaticAdapter::new("p1", vec![video("v1", 1000, &["go", "go", "web"])]);
        manager.register(adapter.clone()).await.unwrap();

        let first = manager.fetch_one("p1").await.unwrap();
        assert_eq!(first.stored, 1);
        let provider = store.provider_by_name("p1").await.unwrap().unwrap();
        let original = store.find_by_external(provider.id, "v1").await.unwrap().unwrap();

        adapter.replace(vec![video("v1", 5000, &["rust"])]);
        manager.fetch_one("p1").await.unwrap();

        assert_eq!(store.content_count().await, 1);
        let updated = store.find_by_external(provider.id, "v1").await.unwrap().unwrap();
        assert_eq!(updated.id, original.id);
        assert!(updated.score > original.score);
        assert_eq!(updated.content_type(), ContentType::Video);

        let tags = store.tags_for(&[updated.id]).await.unwrap();
        assert_eq!(tags[&updated.id], vec!["rust".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_items_do_not_block_the_rest() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        let mut blank = video("", 1, &[]);
        blank.external_id = "  ".into();
        manager
            .register(StaticAdapter::new("p1", vec![blank, video("v2", 10, &[])]))
            .await
            .unwrap();

        let report = manager.fetch_one("p1").await.unwrap();
        assert_eq!((report.fetched, report.stored, report.failed), (2, 1, 1));

        let provider = store.provider_by_name("p1").await.unwrap().unwrap();
        assert!(provider.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_fetch_all_reports_failures_after_attempting_all() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        manager
            .register(StaticAdapter::new("good", vec![video("v1", 10, &[])]))
            .await
            .unwrap();
        manager.register(StaticAdapter::failing("bad")).await.unwrap();

        let err = manager.fetch_all().await.unwrap_err();
        match err {
            Error::ProvidersFailed { failed, attempted } => {
                assert_eq!(failed, vec!["bad".to_string()]);
                assert_eq!(attempted, 2);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(store.content_count().await, 1);
        let good = store.provider_by_name("good").await.unwrap().unwrap();
        let bad = store.provider_by_name("bad").await.unwrap().unwrap();
        assert!(good.last_fetched_at.is_some());
        assert!(bad.last_fetched_at.is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let store = Arc::new(MemoryStore::new());
        let err = manager(&store).fetch_one("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { resource: "provider", .. }));
    }

    #[tokio::test]
    async fn test_register_uses_stored_rate() {
        let store = Arc::new(MemoryStore::new());
        ensure_providers(
            store.as_ref(),
            &[ProviderSpec::new("p1", "http://p1.test", ProviderFormat::Json).with_rate_limit(5)],
        )
        .await
        .unwrap();

        let manager = manager(&store);
        manager.register(StaticAdapter::new("p1", vec![])).await.unwrap();
        manager.register(StaticAdapter::new("p2", vec![])).await.unwrap();

        assert_eq!(manager.names().await, vec!["p1", "p2"]);
        let registry = manager.registry.read().await;
        assert_eq!(registry["p1"].limiter.rate().await, 5);
        assert_eq!(registry["p2"].limiter.rate().await, 60);
    }
}
