//! Route definitions

use super::handlers;
use super::middleware::rate_limit;
use super::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/search", get(handlers::search))
        .route("/content/:id", get(handlers::content))
        .route("/providers", get(handlers::providers))
        .route("/stats", get(handlers::stats))
        .route("/sync", post(handlers::sync));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::config::Settings;
    use crate::metrics::Metrics;
    use crate::model::{ContentDraft, Metrics as ItemMetrics, ProviderFormat, ProviderSpec};
    use crate::providers::ProviderManager;
    use crate::ratelimit::{InboundLimiter, LocalKeyedLimiter};
    use crate::search::SearchService;
    use crate::storage::{ContentStore, MemoryStore, ProviderStore};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn app(limit: Option<u32>) -> Router {
        let settings = Settings::default();
        let store = Arc::new(MemoryStore::new());
        let provider = store
            .save_provider(&ProviderSpec::new("p1", "http://p1.test", ProviderFormat::Json))
            .await
            .unwrap();
        let draft = ContentDraft {
            external_id: "v1".into(),
            title: "Async Rust".into(),
            metrics: ItemMetrics::Video {
                views: 100,
                likes: 5,
                duration_seconds: None,
            },
            published_at: Utc::now(),
            tags: vec!["rust".into()],
        };
        let content = store.insert_content(provider.id, &draft, 2.0).await.unwrap();
        store.replace_tags(content.id, &draft.tags).await.unwrap();

        let metrics = Arc::new(Metrics::new());
        let cache = Arc::new(LocalCache::new(
            Duration::from_secs(60),
            100,
            Duration::from_secs(60),
        ));
        let search = SearchService::new(
            store.clone(),
            store.clone(),
            cache,
            settings.search.clone(),
            metrics.clone(),
        );
        let manager = ProviderManager::new(store.clone(), store.clone(), metrics.clone());

        create_router(AppState {
            settings: Arc::new(settings),
            search: Arc::new(search),
            manager: Arc::new(manager),
            providers: store.clone(),
            contents: store,
            limiter: limit.map(|n| -> Arc<dyn InboundLimiter> {
                Arc::new(LocalKeyedLimiter::per_minute(n))
            }),
            metrics,
        })
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value, axum::http::HeaderMap) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap(), headers)
    }

    #[tokio::test]
    async fn test_search_endpoint() {
        let app = app(None).await;
        let (status, body, _) = get(&app, "/api/v1/search?query=async&type=video").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["results"][0]["title"], "Async Rust");
        assert_eq!(body["data"]["results"][0]["tags"][0], "rust");
    }

    #[tokio::test]
    async fn test_bad_filter_is_400() {
        let app = app(None).await;
        let (status, body, _) = get(&app, "/api/v1/search?type=podcast").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_malformed_query_string_uses_error_envelope() {
        let app = app(None).await;
        let (status, body, _) = get(&app, "/api/v1/search?type=video&type=article").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_content_lookup() {
        let app = app(None).await;
        let (status, body, _) = get(&app, "/api/v1/content/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["external_id"], "v1");

        let (status, body, _) = get(&app, "/api/v1/content/42").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unknown_provider_sync_is_404() {
        let app = app(None).await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/sync?provider=missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rate_limit_headers_and_429() {
        let app = app(Some(2)).await;

        let (status, _, headers) = get(&app, "/api/v1/providers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-ratelimit-limit"], "2");
        assert_eq!(headers["x-ratelimit-remaining"], "1");

        get(&app, "/api/v1/providers").await;
        let (status, body, headers) = get(&app, "/api/v1/providers").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "RATE_LIMITED");
        assert!(headers.contains_key("retry-after"));

        let (status, _, _) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
    }
}
