//! JSON feed adapter
//!
//! ```json
//! {"contents": [{"id": "v1", "title": "...", "type": "video",
//!   "metrics": {"views": 100, "likes": 5, "duration": "12:30"},
//!   "published_at": "2024-03-15T10:00:00Z", "tags": ["go"]}],
//!  "pagination": {"total": 1, "page": 1, "per_page": 10}}
//! ```

use super::traits::{FetchError, ProviderAdapter};
use crate::model::{parse_duration, ContentDraft, ContentType, Metrics, ProviderFormat};
use crate::network::HttpClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    contents: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Item {
    id: String,
    title: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    metrics: ItemMetrics,
    published_at: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ItemMetrics {
    views: Option<u64>,
    likes: Option<u64>,
    duration: Option<String>,
    reading_time: Option<u32>,
    reactions: Option<u64>,
    comments: Option<u64>,
}

impl Item {
    fn into_draft(self) -> Result<ContentDraft, String> {
        let published_at = DateTime::parse_from_rfc3339(self.published_at.trim())
            .map_err(|e| format!("bad published_at '{}': {}", self.published_at, e))?
            .with_timezone(&Utc);

        let m = self.metrics;
        let metrics = match ContentType::normalize(&self.kind) {
            ContentType::Video => Metrics::Video {
                views: m.views.unwrap_or(0),
                likes: m.likes.unwrap_or(0),
                duration_seconds: m.duration.as_deref().map(parse_duration).transpose()?,
            },
            ContentType::Article => Metrics::Article {
                reading_time: m.reading_time,
                reactions: m.reactions.unwrap_or(0),
                comments: m.comments.unwrap_or(0),
            },
        };

        let draft = ContentDraft {
            external_id: self.id.trim().to_string(),
            title: self.title.trim().to_string(),
            metrics,
            published_at,
            tags: self.tags,
        };
        draft.validate()?;
        Ok(draft)
    }
}

pub struct JsonAdapter {
    name: String,
    url: String,
    client: HttpClient,
}

impl JsonAdapter {
    pub fn new(name: impl Into<String>, url: impl Into<String>, client: HttpClient) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl ProviderAdapter for JsonAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn format(&self) -> ProviderFormat {
        ProviderFormat::Json
    }

    fn client(&self) -> &HttpClient {
        &self.client
    }

    fn parse(&self, body: &str) -> Result<Vec<ContentDraft>, FetchError> {
        let feed: Feed =
            serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

        let total = feed.contents.len();
        let drafts: Vec<ContentDraft> = feed
            .contents
            .into_iter()
            .enumerate()
            .filter_map(|(i, raw)| {
                let item = serde_json::from_value::<Item>(raw)
                    .map_err(|e| e.to_string())
                    .and_then(Item::into_draft);
                match item {
                    Ok(draft) => Some(draft),
                    Err(e) => {
                        warn!("{}: dropping item {}: {}", self.name, i, e);
                        None
                    }
                }
            })
            .collect();

        debug!("{}: decoded {} of {} items", self.name, drafts.len(), total);
        Ok(drafts)
    }
}
