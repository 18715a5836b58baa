//! Postgres store

use super::{ContentStore, CorpusStats, ProviderStore, SearchStore, StorageError, StorageResult};
use crate::model::{
    Content, ContentDraft, ContentId, ContentType, Metrics, Provider, ProviderFormat, ProviderSpec,
};
use crate::query::{ContentQuery, KeywordMatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

const CONTENT_COLUMNS: &str = "id, provider_id, external_id, title, content_type, \
     views, likes, duration_seconds, reading_time, reactions, comments, \
     published_at, score, created_at, updated_at";

const PROVIDER_COLUMNS: &str =
    "id, name, url, format, rate_limit_per_minute, last_fetched_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ContentRow {
    id: i64,
    provider_id: i64,
    external_id: String,
    title: String,
    content_type: String,
    views: Option<i64>,
    likes: Option<i64>,
    duration_seconds: Option<i32>,
    reading_time: Option<i32>,
    reactions: Option<i64>,
    comments: Option<i64>,
    published_at: DateTime<Utc>,
    score: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn count(value: Option<i64>) -> u64 {
    value.unwrap_or(0).max(0) as u64
}

impl TryFrom<ContentRow> for Content {
    type Error = StorageError;

    fn try_from(row: ContentRow) -> Result<Self, Self::Error> {
        let content_type: ContentType = row
            .content_type
            .parse()
            .map_err(|e| StorageError::Corrupt(format!("content {}: {}", row.id, e)))?;
        let metrics = match content_type {
            ContentType::Video => Metrics::Video {
                views: count(row.views),
                likes: count(row.likes),
                duration_seconds: row.duration_seconds.map(|d| d.max(0) as u32),
            },
            ContentType::Article => Metrics::Article {
                reading_time: row.reading_time.map(|r| r.max(0) as u32),
                reactions: count(row.reactions),
                comments: count(row.comments),
            },
        };
        Ok(Content {
            id: row.id,
            provider_id: row.provider_id,
            external_id: row.external_id,
            title: row.title,
            metrics,
            published_at: row.published_at,
            score: row.score,
            tags: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProviderRow {
    id: i64,
    name: String,
    url: String,
    format: String,
    rate_limit_per_minute: i32,
    last_fetched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProviderRow> for Provider {
    fn from(row: ProviderRow) -> Self {
        Provider {
            id: row.id,
            name: row.name,
            url: row.url,
            format: ProviderFormat::normalize(&row.format),
            rate_limit_per_minute: row.rate_limit_per_minute.max(1) as u32,
            last_fetched_at: row.last_fetched_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Metric columns in table order, `None` for the absent group
struct MetricColumns {
    views: Option<i64>,
    likes: Option<i64>,
    duration_seconds: Option<i32>,
    reading_time: Option<i32>,
    reactions: Option<i64>,
    comments: Option<i64>,
}

fn column<T: TryFrom<U>, U: Copy + std::fmt::Display>(field: &str, value: U) -> StorageResult<T> {
    T::try_from(value)
        .map_err(|_| StorageError::Invalid(format!("{} {} is out of range", field, value)))
}

impl TryFrom<&Metrics> for MetricColumns {
    type Error = StorageError;

    fn try_from(metrics: &Metrics) -> StorageResult<Self> {
        Ok(match *metrics {
            Metrics::Video {
                views,
                likes,
                duration_seconds,
            } => MetricColumns {
                views: Some(column("views", views)?),
                likes: Some(column("likes", likes)?),
                duration_seconds: duration_seconds
                    .map(|d| column("duration_seconds", d))
                    .transpose()?,
                reading_time: None,
                reactions: None,
                comments: None,
            },
            Metrics::Article {
                reading_time,
                reactions,
                comments,
            } => MetricColumns {
                views: None,
                likes: None,
                duration_seconds: None,
                reading_time: reading_time
                    .map(|r| column("reading_time", r))
                    .transpose()?,
                reactions: Some(column("reactions", reactions)?),
                comments: Some(column("comments", comments)?),
            },
        })
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ContentQuery) {
    builder.push(" WHERE TRUE");
    match &query.keyword {
        Some(KeywordMatch::FullText(terms)) => {
            builder
                .push(" AND to_tsvector('simple', title) @@ to_tsquery('simple', ")
                .push_bind(KeywordMatch::tsquery(terms))
                .push(")");
        }
        Some(KeywordMatch::Substring(needle)) => {
            builder
                .push(" AND title ILIKE ")
                .push_bind(KeywordMatch::like_pattern(needle));
        }
        None => {}
    }
    if let Some(content_type) = query.content_type {
        builder
            .push(" AND content_type = ")
            .push_bind(content_type.as_str());
    }
    if let Some(provider_id) = query.provider_id {
        builder.push(" AND provider_id = ").push_bind(provider_id);
    }
    if let Some(start) = query.published.start {
        builder.push(" AND published_at >= ").push_bind(start);
    }
    if let Some(end) = query.published.end {
        builder.push(" AND published_at < ").push_bind(end);
    }
}

/// Postgres-backed store. Cloning shares the pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        info!("Connected to Postgres with up to {} connections", max_connections);
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl ProviderStore for PgStore {
    async fn provider_by_name(&self, name: &str) -> StorageResult<Option<Provider>> {
        let row = sqlx::query_as::<_, ProviderRow>(&format!(
            "SELECT {} FROM providers WHERE name = $1",
            PROVIDER_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Provider::from))
    }

    async fn providers(&self) -> StorageResult<Vec<Provider>> {
        let rows = sqlx::query_as::<_, ProviderRow>(&format!(
            "SELECT {} FROM providers ORDER BY name",
            PROVIDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Provider::from).collect())
    }

    async fn save_provider(&self, spec: &ProviderSpec) -> StorageResult<Provider> {
        spec.validate().map_err(StorageError::Invalid)?;
        let row = sqlx::query_as::<_, ProviderRow>(&format!(
            r#"
            INSERT INTO providers (name, url, format, rate_limit_per_minute)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE SET
                url = EXCLUDED.url,
                format = EXCLUDED.format,
                rate_limit_per_minute = EXCLUDED.rate_limit_per_minute,
                updated_at = now()
            RETURNING {}
            "#,
            PROVIDER_COLUMNS
        ))
        .bind(&spec.name)
        .bind(&spec.url)
        .bind(spec.format.as_str())
        .bind(spec.rate_limit_per_minute as i32)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn mark_fetched(&self, provider_id: i64, at: DateTime<Utc>) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE providers SET last_fetched_at = $1, updated_at = now() WHERE id = $2",
        )
        .bind(at)
        .bind(provider_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                resource: "provider",
                id: provider_id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn find_by_external(
        &self,
        provider_id: i64,
        external_id: &str,
    ) -> StorageResult<Option<Content>> {
        let row = sqlx::query_as::<_, ContentRow>(&format!(
            "SELECT {} FROM contents WHERE provider_id = $1 AND external_id = $2",
            CONTENT_COLUMNS
        ))
        .bind(provider_id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Content::try_from).transpose()
    }

    async fn insert_content(
        &self,
        provider_id: i64,
        draft: &ContentDraft,
        score: f64,
    ) -> StorageResult<Content> {
        let m = MetricColumns::try_from(&draft.metrics)?;
        let row = sqlx::query_as::<_, ContentRow>(&format!(
            r#"
            INSERT INTO contents (
                provider_id, external_id, title, content_type,
                views, likes, duration_seconds, reading_time, reactions, comments,
                published_at, score
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            CONTENT_COLUMNS
        ))
        .bind(provider_id)
        .bind(&draft.external_id)
        .bind(&draft.title)
        .bind(draft.content_type().as_str())
        .bind(m.views)
        .bind(m.likes)
        .bind(m.duration_seconds)
        .bind(m.reading_time)
        .bind(m.reactions)
        .bind(m.comments)
        .bind(draft.published_at)
        .bind(score)
        .fetch_one(&self.pool)
        .await?;
        Content::try_from(row)
    }

    async fn update_content(
        &self,
        id: ContentId,
        draft: &ContentDraft,
        score: f64,
    ) -> StorageResult<Content> {
        let m = MetricColumns::try_from(&draft.metrics)?;
        let row = sqlx::query_as::<_, ContentRow>(&format!(
            r#"
            UPDATE contents SET
                title = $2, content_type = $3,
                views = $4, likes = $5, duration_seconds = $6,
                reading_time = $7, reactions = $8, comments = $9,
                published_at = $10, score = $11, updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            CONTENT_COLUMNS
        ))
        .bind(id)
        .bind(&draft.title)
        .bind(draft.content_type().as_str())
        .bind(m.views)
        .bind(m.likes)
        .bind(m.duration_seconds)
        .bind(m.reading_time)
        .bind(m.reactions)
        .bind(m.comments)
        .bind(draft.published_at)
        .bind(score)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound {
            resource: "content",
            id: id.to_string(),
        })?;
        Content::try_from(row)
    }

    async fn set_score(&self, id: ContentId, score: f64) -> StorageResult<()> {
        let result =
            sqlx::query("UPDATE contents SET score = $1, updated_at = now() WHERE id = $2")
                .bind(score)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                resource: "content",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn replace_tags(&self, id: ContentId, tags: &[String]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM content_tags WHERE content_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if !tags.is_empty() {
            let mut builder = QueryBuilder::<Postgres>::new("INSERT INTO content_tags (content_id, tag) ");
            builder.push_values(tags, |mut row, tag| {
                row.push_bind(id).push_bind(tag.clone());
            });
            builder.push(" ON CONFLICT (content_id, tag) DO NOTHING");
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!("Replaced tags of content {} with {} labels", id, tags.len());
        Ok(())
    }

    async fn content_by_id(&self, id: ContentId) -> StorageResult<Option<Content>> {
        let row = sqlx::query_as::<_, ContentRow>(&format!(
            "SELECT {} FROM contents WHERE id = $1",
            CONTENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Content::try_from).transpose()
    }

    async fn contents_after(
        &self,
        provider_id: Option<i64>,
        after: ContentId,
        limit: u32,
    ) -> StorageResult<Vec<Content>> {
        let rows = sqlx::query_as::<_, ContentRow>(&format!(
            r#"
            SELECT {} FROM contents
            WHERE id > $1 AND ($2::BIGINT IS NULL OR provider_id = $2)
            ORDER BY id ASC
            LIMIT $3
            "#,
            CONTENT_COLUMNS
        ))
        .bind(after)
        .bind(provider_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Content::try_from).collect()
    }

    async fn stats(&self) -> StorageResult<CorpusStats> {
        let (total, videos, articles, average_score): (i64, i64, i64, f64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE content_type = 'video'),
                COUNT(*) FILTER (WHERE content_type = 'article'),
                COALESCE(AVG(score), 0)::FLOAT8
            FROM contents
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let by_provider: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT p.name, COUNT(c.id)
            FROM providers p
            LEFT JOIN contents c ON c.provider_id = p.id
            GROUP BY p.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let distinct_tags: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT tag) FROM content_tags")
            .fetch_one(&self.pool)
            .await?;

        Ok(CorpusStats {
            total: total as u64,
            videos: videos as u64,
            articles: articles as u64,
            by_provider: by_provider
                .into_iter()
                .map(|(name, n)| (name, n as u64))
                .collect(),
            average_score,
            distinct_tags: distinct_tags as u64,
        })
    }
}

#[async_trait]
impl SearchStore for PgStore {
    async fn count(&self, query: &ContentQuery) -> StorageResult<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM contents");
        push_filters(&mut builder, query);
        let total: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }

    async fn page(&self, query: &ContentQuery) -> StorageResult<Vec<Content>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM contents", CONTENT_COLUMNS));
        push_filters(&mut builder, query);
        builder
            .push(" ORDER BY ")
            .push(query.order_by())
            .push(" LIMIT ")
            .push_bind(query.limit as i64)
            .push(" OFFSET ")
            .push_bind(query.offset as i64);

        debug!("Page query: {}", builder.sql());
        let rows: Vec<ContentRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Content::try_from).collect()
    }

    async fn tags_for(&self, ids: &[ContentId]) -> StorageResult<HashMap<ContentId, Vec<String>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT content_id, tag FROM content_tags WHERE content_id = ANY($1) ORDER BY content_id, id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut tags: HashMap<ContentId, Vec<String>> = HashMap::new();
        for (content_id, tag) in rows {
            tags.entry(content_id).or_default().push(tag);
        }
        Ok(tags)
    }
}
