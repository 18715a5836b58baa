//! XML feed adapter
//!
//! ```xml
//! <feed>
//!   <items>
//!     <item>
//!       <id>v1</id><headline>...</headline><type>video</type>
//!       <stats><views>100</views><likes>5</likes><duration>12:30</duration></stats>
//!       <publication_date>2024-03-15</publication_date>
//!       <categories><category>go</category></categories>
//!     </item>
//!   </items>
//!   <meta><total_count>1</total_count></meta>
//! </feed>
//! ```
//!
//! Every number arrives as text; blank means zero.

use super::traits::{lenient_count, FetchError, ProviderAdapter};
use crate::model::{parse_duration, ContentDraft, ContentType, Metrics, ProviderFormat};
use crate::network::HttpClient;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    items: Items,
}

#[derive(Debug, Default, Deserialize)]
struct Items {
    #[serde(default)]
    item: Vec<Item>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Item {
    id: String,
    headline: String,
    #[serde(rename = "type")]
    kind: String,
    stats: Stats,
    publication_date: String,
    categories: Categories,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Stats {
    views: Option<String>,
    likes: Option<String>,
    duration: Option<String>,
    reading_time: Option<String>,
    reactions: Option<String>,
    comments: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Categories {
    category: Vec<String>,
}

fn parse_publication_date(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN)));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("bad publication_date '{}'", raw))
}

impl Item {
    fn into_draft(self) -> Result<ContentDraft, String> {
        let published_at = parse_publication_date(&self.publication_date)?;
        let s = self.stats;

        let metrics = match ContentType::normalize(&self.kind) {
            ContentType::Video => Metrics::Video {
                views: lenient_count(s.views.as_deref())?,
                likes: lenient_count(s.likes.as_deref())?,
                duration_seconds: s
                    .duration
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(parse_duration)
                    .transpose()?,
            },
            ContentType::Article => Metrics::Article {
                reading_time: match s.reading_time.as_deref().map(str::trim) {
                    None | Some("") => None,
                    Some(raw) => Some(
                        u32::try_from(lenient_count(Some(raw))?)
                            .map_err(|_| format!("reading_time '{}' is out of range", raw))?,
                    ),
                },
                reactions: lenient_count(s.reactions.as_deref())?,
                comments: lenient_count(s.comments.as_deref())?,
            },
        };

        let draft = ContentDraft {
            external_id: self.id.trim().to_string(),
            title: self.headline.trim().to_string(),
            metrics,
            published_at,
            tags: self
                .categories
                .category
                .into_iter()
                .map(|c| c.trim().to_string())
                .collect(),
        };
        draft.validate()?;
        Ok(draft)
    }
}

pub struct XmlAdapter {
    name: String,
    url: String,
    client: HttpClient,
}

impl XmlAdapter {
    pub fn new(name: impl Into<String>, url: impl Into<String>, client: HttpClient) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl ProviderAdapter for XmlAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn format(&self) -> ProviderFormat {
        ProviderFormat::Xml
    }

    fn client(&self) -> &HttpClient {
        &self.client
    }

    fn parse(&self, body: &str) -> Result<Vec<ContentDraft>, FetchError> {
        let feed: Feed = from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

        let total = feed.items.item.len();
        let drafts: Vec<ContentDraft> = feed
            .items
            .item
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| match item.into_draft() {
                Ok(draft) => Some(draft),
                Err(e) => {
                    warn!("{}: dropping item {}: {}", self.name, i, e);
                    None
                }
            })
            .collect();

        debug!("{}: decoded {} of {} items", self.name, drafts.len(), total);
        Ok(drafts)
    }
}
