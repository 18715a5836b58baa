//! Unified content representation shared by every provider

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Internal surrogate id of a stored content item
pub type ContentId = i64;

/// Kind of a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Article,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Article => "article",
        }
    }

    /// Map a free-text provider label onto a content type.
    ///
    /// Unknown labels fall back to `Video`.
    pub fn normalize(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "article" | "text" | "post" => ContentType::Article,
            _ => ContentType::Video,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    /// Strict parse used for request filters, unlike [`ContentType::normalize`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(ContentType::Video),
            "article" => Ok(ContentType::Article),
            other => Err(format!("unknown content type '{}'", other)),
        }
    }
}

/// Type-specific metrics. Exactly one group exists per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Metrics {
    Video {
        views: u64,
        likes: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<u32>,
    },
    Article {
        /// Minutes
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reading_time: Option<u32>,
        reactions: u64,
        comments: u64,
    },
}

/// Largest count a store column can hold
pub const MAX_COUNT: u64 = i64::MAX as u64;
/// Largest duration or reading time a store column can hold
pub const MAX_SPAN: u32 = i32::MAX as u32;

impl Metrics {
    /// Reject values the storage columns cannot represent
    pub fn check_range(&self) -> Result<(), String> {
        let (counts, span) = match *self {
            Metrics::Video {
                views,
                likes,
                duration_seconds,
            } => ([("views", views), ("likes", likes)], ("duration", duration_seconds)),
            Metrics::Article {
                reading_time,
                reactions,
                comments,
            } => (
                [("reactions", reactions), ("comments", comments)],
                ("reading_time", reading_time),
            ),
        };
        if let Some((field, value)) = counts.iter().find(|(_, v)| *v > MAX_COUNT) {
            return Err(format!("{} {} is out of range", field, value));
        }
        match span {
            (field, Some(value)) if value > MAX_SPAN => {
                Err(format!("{} {} is out of range", field, value))
            }
            _ => Ok(()),
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Metrics::Video { .. } => ContentType::Video,
            Metrics::Article { .. } => ContentType::Article,
        }
    }
}

/// A normalized item as produced by a provider adapter, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentDraft {
    pub external_id: String,
    pub title: String,
    pub metrics: Metrics,
    pub published_at: DateTime<Utc>,
    pub tags: Vec<String>,
}

impl ContentDraft {
    pub fn content_type(&self) -> ContentType {
        self.metrics.content_type()
    }

    /// Check the fields storage relies on
    pub fn validate(&self) -> Result<(), String> {
        if self.external_id.trim().is_empty() {
            return Err("external_id is required".to_string());
        }
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        self.metrics.check_range()
    }

    /// Tags with duplicates and blank labels removed, first occurrence wins
    pub fn unique_tags(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.tags
            .iter()
            .filter(|t| !t.trim().is_empty())
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }
}

/// A persisted content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: ContentId,
    pub provider_id: i64,
    pub external_id: String,
    pub title: String,
    #[serde(flatten)]
    pub metrics: Metrics,
    pub published_at: DateTime<Utc>,
    pub score: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Content {
    pub fn content_type(&self) -> ContentType {
        self.metrics.content_type()
    }

    pub fn is_video(&self) -> bool {
        self.content_type() == ContentType::Video
    }

    /// Duration as `MM:SS`, videos only
    pub fn duration_label(&self) -> Option<String> {
        match self.metrics {
            Metrics::Video {
                duration_seconds: Some(secs),
                ..
            } => Some(format!("{:02}:{:02}", secs / 60, secs % 60)),
            _ => None,
        }
    }
}

/// Parse a `MM:SS` or `HH:MM:SS` duration into seconds
pub fn parse_duration(raw: &str) -> Result<u32, String> {
    let raw = raw.trim();
    let parts = raw
        .split(':')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("invalid duration '{}'", raw))?;

    let seconds = match parts.as_slice() {
        [m, s] if *s < 60 => m.checked_mul(60).and_then(|v| v.checked_add(*s)),
        [h, m, s] if *m < 60 && *s < 60 => h
            .checked_mul(3600)
            .and_then(|v| v.checked_add(m * 60 + s)),
        _ => return Err(format!("invalid duration '{}', expected MM:SS or HH:MM:SS", raw)),
    };
    seconds.ok_or_else(|| format!("invalid duration '{}', out of range", raw))
}
