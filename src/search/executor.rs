//! Search execution
//!
//! A search consults the cache, then counts and pages the matching rows
//! under separate budgets, then batch-loads tags for the page. Only the
//! page query is allowed to fail the request; a slow count yields an
//! unknown total and a failed tag load yields empty tags.

use super::models::{RequestContext, SearchRequest, SearchResponse};
use crate::cache::{self, Cache};
use crate::config::SearchSettings;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::model::{Content, ContentId};
use crate::storage::{ContentStore, SearchStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub struct SearchService {
    store: Arc<dyn SearchStore>,
    contents: Arc<dyn ContentStore>,
    cache: Arc<dyn Cache>,
    settings: SearchSettings,
    metrics: Arc<Metrics>,
}

impl SearchService {
    pub fn new(
        store: Arc<dyn SearchStore>,
        contents: Arc<dyn ContentStore>,
        cache: Arc<dyn Cache>,
        settings: SearchSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            contents,
            cache,
            settings,
            metrics,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Run a validated search
    pub async fn search(&self, ctx: &RequestContext, req: &SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();
        self.metrics.inc_search();
        let key = req.cache_key();

        if let Some(cached) = self.cached(ctx, &key).await {
            self.metrics.inc_cache_hit();
            debug!(request_id = %ctx.request_id, "Search served from {} cache", self.cache.backend());
            return Ok(cached);
        }

        let query = req.to_query(self.settings.min_fulltext_length);
        debug!(request_id = %ctx.request_id, "Searching: {}", query);

        let count_budget = ctx.budget(self.settings.count_timeout());
        let page_budget = ctx.budget(self.settings.query_timeout());
        let (counted, paged) = tokio::join!(
            timeout(count_budget, self.store.count(&query)),
            timeout(page_budget, self.store.page(&query)),
        );

        let total = match counted {
            Ok(Ok(total)) => Some(total),
            Ok(Err(e)) => {
                warn!(request_id = %ctx.request_id, "Count failed, total unknown: {}", e);
                self.metrics.inc_degraded_count();
                None
            }
            Err(_) => {
                warn!(
                    request_id = %ctx.request_id,
                    "Count exceeded {:?}, total unknown", count_budget
                );
                self.metrics.inc_degraded_count();
                None
            }
        };

        let mut results = match paged {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => return Err(Error::storage("search", e)),
            Err(_) => {
                self.metrics.inc_search_timeout();
                return Err(Error::Timeout {
                    operation: "search",
                    budget: page_budget,
                });
            }
        };

        let ids: Vec<ContentId> = results.iter().map(|c| c.id).collect();
        let mut tags = self.load_tags(ctx, &ids).await;
        for content in &mut results {
            content.tags = tags.remove(&content.id).unwrap_or_default();
        }

        let response = SearchResponse::assemble(results, total, req.page, req.per_page);
        // A degraded answer is served once; the next request retries the count.
        if response.total.is_some() {
            self.store_cached(ctx, &key, &response).await;
        }

        info!(
            request_id = %ctx.request_id,
            "Search returned {} of {:?} results in {:?}",
            response.results.len(),
            response.total,
            start.elapsed()
        );
        Ok(response)
    }

    /// Single item with its tags
    pub async fn content_by_id(&self, ctx: &RequestContext, id: ContentId) -> Result<Content> {
        let budget = ctx.budget(self.settings.simple_query_timeout());
        let mut content = timeout(budget, self.contents.content_by_id(id))
            .await
            .map_err(|_| Error::Timeout {
                operation: "content lookup",
                budget,
            })?
            .map_err(|e| Error::storage("content lookup", e))?
            .ok_or_else(|| Error::not_found("content", id))?;

        content.tags = self.load_tags(ctx, &[id]).await.remove(&id).unwrap_or_default();
        Ok(content)
    }

    async fn load_tags(
        &self,
        ctx: &RequestContext,
        ids: &[ContentId],
    ) -> HashMap<ContentId, Vec<String>> {
        if ids.is_empty() {
            return HashMap::new();
        }
        let budget = ctx.budget(self.settings.simple_query_timeout());
        match timeout(budget, self.store.tags_for(ids)).await {
            Ok(Ok(tags)) => tags,
            Ok(Err(e)) => {
                warn!(request_id = %ctx.request_id, "Tag load failed, leaving tags empty: {}", e);
                HashMap::new()
            }
            Err(_) => {
                warn!(request_id = %ctx.request_id, "Tag load exceeded {:?}", budget);
                HashMap::new()
            }
        }
    }

    async fn cached(&self, ctx: &RequestContext, key: &str) -> Option<SearchResponse> {
        let budget = ctx.budget(self.settings.simple_query_timeout());
        timeout(budget, cache::get_json(self.cache.as_ref(), key))
            .await
            .ok()
            .flatten()
    }

    async fn store_cached(&self, ctx: &RequestContext, key: &str, response: &SearchResponse) {
        let budget = ctx.budget(self.settings.simple_query_timeout());
        let write = cache::set_json(self.cache.as_ref(), key, response, self.settings.cache_ttl());
        if timeout(budget, write).await.is_err() {
            warn!(request_id = %ctx.request_id, "Cache write exceeded {:?}", budget);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::error::ErrorKind;
    use crate::model::{ContentDraft, Metrics as ItemMetrics, ProviderFormat, ProviderSpec};
    use crate::query::ContentQuery;
    use crate::storage::{MemoryStore, ProviderStore, StorageError, StorageResult};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    /// Delays or fails selected calls of an inner store
    struct Faulty {
        inner: Arc<MemoryStore>,
        count_delay: Option<Duration>,
        page_delay: Option<Duration>,
        tags_fail: bool,
    }

    impl Faulty {
        fn wrap(inner: &Arc<MemoryStore>) -> Self {
            Self {
                inner: inner.clone(),
                count_delay: None,
                page_delay: None,
                tags_fail: false,
            }
        }
    }

    #[async_trait]
    impl SearchStore for Faulty {
        async fn count(&self, query: &ContentQuery) -> StorageResult<u64> {
            if let Some(delay) = self.count_delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.count(query).await
        }

        async fn page(&self, query: &ContentQuery) -> StorageResult<Vec<Content>> {
            if let Some(delay) = self.page_delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.page(query).await
        }

        async fn tags_for(&self, ids: &[ContentId]) -> StorageResult<HashMap<ContentId, Vec<String>>> {
            if self.tags_fail {
                return Err(StorageError::Unavailable("tags offline".into()));
            }
            self.inner.tags_for(ids).await
        }
    }

    async fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let provider = store
            .save_provider(&ProviderSpec::new("p1", "http://p1.test", ProviderFormat::Json))
            .await
            .unwrap();
        let titles = ["Go Concurrency", "Rust Ownership", "Go Generics"];
        for (i, title) in titles.iter().enumerate() {
            let draft = ContentDraft {
                external_id: format!("c{}", i),
                title: title.to_string(),
                metrics: ItemMetrics::Article {
                    reading_time: Some(5),
                    reactions: 10 * (i as u64 + 1),
                    comments: 0,
                },
                published_at: Utc.with_ymd_and_hms(2024, 1, 1 + i as u32, 0, 0, 0).unwrap(),
                tags: vec!["programming".into()],
            };
            let content = store
                .insert_content(provider.id, &draft, (i + 1) as f64)
                .await
                .unwrap();
            store.replace_tags(content.id, &draft.tags).await.unwrap();
        }
        store
    }

    fn service(store: Arc<dyn SearchStore>, contents: Arc<MemoryStore>) -> SearchService {
        let cache = Arc::new(LocalCache::new(
            Duration::from_secs(60),
            100,
            Duration::from_secs(60),
        ));
        SearchService::new(
            store,
            contents,
            cache,
            SearchSettings::default(),
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test]
    async fn test_search_orders_and_loads_tags() {
        let store = seeded().await;
        let svc = service(store.clone(), store.clone());

        let response = svc
            .search(&RequestContext::new(), &SearchRequest::default())
            .await
            .unwrap();
        assert_eq!(response.total, Some(3));
        assert_eq!(response.total_pages, 1);
        let titles: Vec<&str> = response.results.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Go Generics", "Rust Ownership", "Go Concurrency"]);
        assert!(response.results.iter().all(|c| c.tags == vec!["programming"]));
    }

    #[tokio::test]
    async fn test_second_search_is_served_from_cache() {
        let store = seeded().await;
        let svc = service(store.clone(), store.clone());
        let req = SearchRequest {
            keyword: Some("go".into()),
            ..SearchRequest::default()
        };

        let first = svc.search(&RequestContext::new(), &req).await.unwrap();
        assert_eq!(first.total, Some(2));

        let provider = store.provider_by_name("p1").await.unwrap().unwrap();
        let draft = ContentDraft {
            external_id: "late".into(),
            title: "Go Modules".into(),
            metrics: ItemMetrics::Article {
                reading_time: None,
                reactions: 0,
                comments: 0,
            },
            published_at: Utc::now(),
            tags: Vec::new(),
        };
        store.insert_content(provider.id, &draft, 0.0).await.unwrap();

        let second = svc.search(&RequestContext::new(), &req).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(svc.metrics.snapshot().cache_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_count_degrades_to_unknown_total() {
        let store = seeded().await;
        let mut faulty = Faulty::wrap(&store);
        faulty.count_delay = Some(Duration::from_secs(60));
        let svc = service(Arc::new(faulty), store.clone());

        let req = SearchRequest {
            per_page: 2,
            ..SearchRequest::default()
        };
        let response = svc.search(&RequestContext::new(), &req).await.unwrap();
        assert_eq!(response.total, None);
        assert_eq!(response.total_pages, 0);
        assert_eq!(response.results.len(), 2);
        assert!(response.has_next);
        assert_eq!(svc.metrics.snapshot().degraded_counts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_response_is_not_cached() {
        let store = seeded().await;
        let mut faulty = Faulty::wrap(&store);
        faulty.count_delay = Some(Duration::from_secs(60));
        let svc = service(Arc::new(faulty), store.clone());

        let req = SearchRequest::default();
        svc.search(&RequestContext::new(), &req).await.unwrap();
        let again = svc.search(&RequestContext::new(), &req).await.unwrap();
        assert_eq!(again.total, None);

        let snapshot = svc.metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 0);
        assert_eq!(snapshot.degraded_counts, 2);
    }

    #[tokio::test]
    async fn test_partial_last_page_and_past_the_end() {
        let store = Arc::new(MemoryStore::new());
        let provider = store
            .save_provider(&ProviderSpec::new("p1", "http://p1.test", ProviderFormat::Json))
            .await
            .unwrap();
        for i in 0..25 {
            let draft = ContentDraft {
                external_id: format!("v{}", i),
                title: format!("Clip {}", i),
                metrics: ItemMetrics::Video {
                    views: i,
                    likes: 0,
                    duration_seconds: None,
                },
                published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                tags: Vec::new(),
            };
            store.insert_content(provider.id, &draft, i as f64).await.unwrap();
        }
        let svc = service(store.clone(), store);

        let page = |page| SearchRequest {
            page,
            per_page: 10,
            ..SearchRequest::default()
        };

        let third = svc.search(&RequestContext::new(), &page(3)).await.unwrap();
        assert_eq!(third.total, Some(25));
        assert_eq!(third.total_pages, 3);
        assert_eq!(third.results.len(), 5);
        assert_eq!(third.results[0].title, "Clip 4");
        assert!(!third.has_next);
        assert!(third.has_prev);

        let beyond = svc.search(&RequestContext::new(), &page(4)).await.unwrap();
        assert!(beyond.results.is_empty());
        assert_eq!(beyond.total, Some(25));
        assert_eq!(beyond.total_pages, 3);
        assert!(!beyond.has_next);
        assert!(beyond.has_prev);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_page_is_a_timeout() {
        let store = seeded().await;
        let mut faulty = Faulty::wrap(&store);
        faulty.page_delay = Some(Duration::from_secs(60));
        let svc = service(Arc::new(faulty), store.clone());

        let err = svc
            .search(&RequestContext::new(), &SearchRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_deadline_caps_the_budget() {
        let store = seeded().await;
        let mut faulty = Faulty::wrap(&store);
        faulty.page_delay = Some(Duration::from_secs(2));
        let svc = service(Arc::new(faulty), store.clone());

        let ctx = RequestContext::new().with_timeout(Duration::from_secs(1));
        let err = svc.search(&ctx, &SearchRequest::default()).await.unwrap_err();
        match err {
            Error::Timeout { budget, .. } => assert!(budget <= Duration::from_secs(1)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_tag_failure_leaves_tags_empty() {
        let store = seeded().await;
        let mut faulty = Faulty::wrap(&store);
        faulty.tags_fail = true;
        let svc = service(Arc::new(faulty), store.clone());

        let response = svc
            .search(&RequestContext::new(), &SearchRequest::default())
            .await
            .unwrap();
        assert_eq!(response.results.len(), 3);
        assert!(response.results.iter().all(|c| c.tags.is_empty()));
    }

    #[tokio::test]
    async fn test_content_by_id() {
        let store = seeded().await;
        let svc = service(store.clone(), store.clone());
        let ctx = RequestContext::new();

        let content = svc.content_by_id(&ctx, 1).await.unwrap();
        assert_eq!(content.tags, vec!["programming"]);

        let err = svc.content_by_id(&ctx, 999).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
