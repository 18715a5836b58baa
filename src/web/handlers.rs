//! HTTP request handlers

use super::extract::{ApiPath, ApiQuery};
use super::response::{ok, ApiResponse};
use super::state::AppState;
use crate::error::{Error, Result};
use crate::metrics::MetricsSnapshot;
use crate::model::{Content, Provider};
use crate::providers::SyncReport;
use crate::search::{SearchParams, SearchRequest, SearchResponse};
use crate::storage::CorpusStats;
use axum::{
    extract::State,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

/// Health check handler
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// `GET /api/v1/search`
pub async fn search(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> Result<Json<ApiResponse<SearchResponse>>> {
    let request = SearchRequest::from_params(&params, &state.settings.search)?;
    let ctx = state.request_context();
    let response = state.search.search(&ctx, &request).await?;
    Ok(ok(response))
}

/// `GET /api/v1/content/:id`
pub async fn content(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<ApiResponse<Content>>> {
    let id: i64 = id
        .trim()
        .parse()
        .map_err(|_| Error::Validation(format!("content id must be an integer, got '{}'", id)))?;
    let ctx = state.request_context();
    let content = state.search.content_by_id(&ctx, id).await?;
    Ok(ok(content))
}

/// `GET /api/v1/providers`
pub async fn providers(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Provider>>>> {
    let providers = state
        .providers
        .providers()
        .await
        .map_err(|e| Error::storage("list providers", e))?;
    Ok(ok(providers))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub corpus: CorpusStats,
    pub runtime: MetricsSnapshot,
}

/// `GET /api/v1/stats`
pub async fn stats(State(state): State<AppState>) -> Result<Json<ApiResponse<StatsResponse>>> {
    let corpus = state
        .contents
        .stats()
        .await
        .map_err(|e| Error::storage("corpus stats", e))?;
    Ok(ok(StatsResponse {
        corpus,
        runtime: state.metrics.snapshot(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SyncParams {
    pub provider: Option<String>,
}

/// `POST /api/v1/sync[?provider=name]`
pub async fn sync(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SyncParams>,
) -> Result<Json<ApiResponse<Vec<SyncReport>>>> {
    let reports = match params.provider.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => vec![state.manager.fetch_one(name).await?],
        _ => state.manager.fetch_all().await?,
    };
    Ok(ok(reports))
}
