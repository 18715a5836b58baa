//! Persistence
//!
//! Three narrow traits cover what the rest of the crate needs from a store.
//! [`PgStore`] implements them over Postgres; [`MemoryStore`] keeps
//! everything in process for development and tests.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::model::{Content, ContentDraft, ContentId, Provider, ProviderSpec};
use crate::query::ContentQuery;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("{0}")]
    Invalid(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Aggregate figures over the stored corpus
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorpusStats {
    pub total: u64,
    pub videos: u64,
    pub articles: u64,
    pub by_provider: BTreeMap<String, u64>,
    pub average_score: f64,
    pub distinct_tags: u64,
}

#[async_trait]
pub trait ProviderStore: Send + Sync {
    async fn provider_by_name(&self, name: &str) -> StorageResult<Option<Provider>>;

    async fn providers(&self) -> StorageResult<Vec<Provider>>;

    /// Insert or update by name
    async fn save_provider(&self, spec: &ProviderSpec) -> StorageResult<Provider>;

    async fn mark_fetched(&self, provider_id: i64, at: DateTime<Utc>) -> StorageResult<()>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_by_external(
        &self,
        provider_id: i64,
        external_id: &str,
    ) -> StorageResult<Option<Content>>;

    async fn insert_content(
        &self,
        provider_id: i64,
        draft: &ContentDraft,
        score: f64,
    ) -> StorageResult<Content>;

    /// Overwrite title, metrics, publication time and score in place
    async fn update_content(
        &self,
        id: ContentId,
        draft: &ContentDraft,
        score: f64,
    ) -> StorageResult<Content>;

    async fn set_score(&self, id: ContentId, score: f64) -> StorageResult<()>;

    /// Delete every tag of `id` and insert `tags`, atomically
    async fn replace_tags(&self, id: ContentId, tags: &[String]) -> StorageResult<()>;

    async fn content_by_id(&self, id: ContentId) -> StorageResult<Option<Content>>;

    /// Up to `limit` items with id greater than `after`, ascending by id
    async fn contents_after(
        &self,
        provider_id: Option<i64>,
        after: ContentId,
        limit: u32,
    ) -> StorageResult<Vec<Content>>;

    async fn stats(&self) -> StorageResult<CorpusStats>;
}

#[async_trait]
pub trait SearchStore: Send + Sync {
    async fn count(&self, query: &ContentQuery) -> StorageResult<u64>;

    /// The requested page, tags not loaded
    async fn page(&self, query: &ContentQuery) -> StorageResult<Vec<Content>>;

    async fn tags_for(&self, ids: &[ContentId]) -> StorageResult<HashMap<ContentId, Vec<String>>>;
}
