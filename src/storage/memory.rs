//! In-process store

use super::{ContentStore, CorpusStats, ProviderStore, SearchStore, StorageError, StorageResult};
use crate::model::{Content, ContentDraft, ContentId, ContentType, Provider, ProviderSpec};
use crate::query::{ContentQuery, SortDirection, SortField};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    providers: BTreeMap<i64, Provider>,
    contents: BTreeMap<ContentId, Content>,
    tags: HashMap<ContentId, Vec<String>>,
    next_provider_id: i64,
    next_content_id: ContentId,
}

impl Tables {
    fn matching<'a>(&'a self, query: &'a ContentQuery) -> impl Iterator<Item = &'a Content> + 'a {
        self.contents.values().filter(move |c| {
            query.keyword.as_ref().map_or(true, |k| k.matches(&c.title))
                && query.content_type.map_or(true, |t| c.content_type() == t)
                && query.provider_id.map_or(true, |p| c.provider_id == p)
                && query.published.contains(c.published_at)
        })
    }
}

fn compare(a: &Content, b: &Content, field: SortField, direction: SortDirection) -> Ordering {
    let primary = match field {
        SortField::Score => a.score.total_cmp(&b.score),
        SortField::PublishedAt => a.published_at.cmp(&b.published_at),
        SortField::Title => a.title.cmp(&b.title),
        SortField::Id => a.id.cmp(&b.id),
    };
    let primary = match direction {
        SortDirection::Asc => primary,
        SortDirection::Desc => primary.reverse(),
    };
    primary.then_with(|| b.id.cmp(&a.id))
}

/// Store kept entirely in memory, lost on exit
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn content_count(&self) -> usize {
        self.tables.read().await.contents.len()
    }
}

#[async_trait]
impl ProviderStore for MemoryStore {
    async fn provider_by_name(&self, name: &str) -> StorageResult<Option<Provider>> {
        let tables = self.tables.read().await;
        Ok(tables.providers.values().find(|p| p.name == name).cloned())
    }

    async fn providers(&self) -> StorageResult<Vec<Provider>> {
        let tables = self.tables.read().await;
        let mut providers: Vec<Provider> = tables.providers.values().cloned().collect();
        providers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(providers)
    }

    async fn save_provider(&self, spec: &ProviderSpec) -> StorageResult<Provider> {
        spec.validate().map_err(StorageError::Invalid)?;
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        if let Some(existing) = tables.providers.values_mut().find(|p| p.name == spec.name) {
            existing.url = spec.url.clone();
            existing.format = spec.format;
            existing.rate_limit_per_minute = spec.rate_limit_per_minute;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        tables.next_provider_id += 1;
        let provider = Provider {
            id: tables.next_provider_id,
            name: spec.name.clone(),
            url: spec.url.clone(),
            format: spec.format,
            rate_limit_per_minute: spec.rate_limit_per_minute,
            last_fetched_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.providers.insert(provider.id, provider.clone());
        Ok(provider)
    }

    async fn mark_fetched(&self, provider_id: i64, at: DateTime<Utc>) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let provider = tables
            .providers
            .get_mut(&provider_id)
            .ok_or_else(|| StorageError::NotFound {
                resource: "provider",
                id: provider_id.to_string(),
            })?;
        provider.last_fetched_at = Some(at);
        provider.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn find_by_external(
        &self,
        provider_id: i64,
        external_id: &str,
    ) -> StorageResult<Option<Content>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contents
            .values()
            .find(|c| c.provider_id == provider_id && c.external_id == external_id)
            .cloned())
    }

    async fn insert_content(
        &self,
        provider_id: i64,
        draft: &ContentDraft,
        score: f64,
    ) -> StorageResult<Content> {
        draft.metrics.check_range().map_err(StorageError::Invalid)?;
        let mut tables = self.tables.write().await;
        if !tables.providers.contains_key(&provider_id) {
            return Err(StorageError::NotFound {
                resource: "provider",
                id: provider_id.to_string(),
            });
        }
        let duplicate = tables
            .contents
            .values()
            .any(|c| c.provider_id == provider_id && c.external_id == draft.external_id);
        if duplicate {
            return Err(StorageError::Invalid(format!(
                "content {} already exists for provider {}",
                draft.external_id, provider_id
            )));
        }

        tables.next_content_id += 1;
        let now = Utc::now();
        let content = Content {
            id: tables.next_content_id,
            provider_id,
            external_id: draft.external_id.clone(),
            title: draft.title.clone(),
            metrics: draft.metrics.clone(),
            published_at: draft.published_at,
            score,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tables.contents.insert(content.id, content.clone());
        Ok(content)
    }

    async fn update_content(
        &self,
        id: ContentId,
        draft: &ContentDraft,
        score: f64,
    ) -> StorageResult<Content> {
        draft.metrics.check_range().map_err(StorageError::Invalid)?;
        let mut tables = self.tables.write().await;
        let content = tables
            .contents
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound {
                resource: "content",
                id: id.to_string(),
            })?;
        content.title = draft.title.clone();
        content.metrics = draft.metrics.clone();
        content.published_at = draft.published_at;
        content.score = score;
        content.updated_at = Utc::now();
        Ok(content.clone())
    }

    async fn set_score(&self, id: ContentId, score: f64) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let content = tables
            .contents
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound {
                resource: "content",
                id: id.to_string(),
            })?;
        content.score = score;
        content.updated_at = Utc::now();
        Ok(())
    }

    async fn replace_tags(&self, id: ContentId, tags: &[String]) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let mut seen = BTreeSet::new();
        let unique: Vec<String> = tags
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect();
        tables.tags.insert(id, unique);
        Ok(())
    }

    async fn content_by_id(&self, id: ContentId) -> StorageResult<Option<Content>> {
        Ok(self.tables.read().await.contents.get(&id).cloned())
    }

    async fn contents_after(
        &self,
        provider_id: Option<i64>,
        after: ContentId,
        limit: u32,
    ) -> StorageResult<Vec<Content>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contents
            .range(after + 1..)
            .map(|(_, c)| c)
            .filter(|c| provider_id.map_or(true, |p| c.provider_id == p))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> StorageResult<CorpusStats> {
        let tables = self.tables.read().await;
        let mut stats = CorpusStats::default();
        let mut score_sum = 0.0;

        for provider in tables.providers.values() {
            stats.by_provider.insert(provider.name.clone(), 0);
        }
        for content in tables.contents.values() {
            stats.total += 1;
            match content.content_type() {
                ContentType::Video => stats.videos += 1,
                ContentType::Article => stats.articles += 1,
            }
            score_sum += content.score;
            if let Some(provider) = tables.providers.get(&content.provider_id) {
                *stats.by_provider.entry(provider.name.clone()).or_insert(0) += 1;
            }
        }
        if stats.total > 0 {
            stats.average_score = score_sum / stats.total as f64;
        }
        stats.distinct_tags = tables
            .tags
            .values()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len() as u64;
        Ok(stats)
    }
}

#[async_trait]
impl SearchStore for MemoryStore {
    async fn count(&self, query: &ContentQuery) -> StorageResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables.matching(query).count() as u64)
    }

    async fn page(&self, query: &ContentQuery) -> StorageResult<Vec<Content>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&Content> = tables.matching(query).collect();
        rows.sort_by(|a, b| compare(a, b, query.sort, query.direction));
        Ok(rows
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn tags_for(&self, ids: &[ContentId]) -> StorageResult<HashMap<ContentId, Vec<String>>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                tables
                    .tags
                    .get(id)
                    .filter(|t| !t.is_empty())
                    .map(|t| (*id, t.clone()))
            })
            .collect())
    }
}
