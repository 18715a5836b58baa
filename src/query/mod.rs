//! Query construction
//!
//! Turns a validated search request into a [`ContentQuery`]: a backend
//! neutral description of filters, ordering and paging. Every value that
//! reaches SQL is either bound as a parameter or drawn from a fixed
//! allow-list of column names.

use crate::model::ContentType;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sortable columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Score,
    PublishedAt,
    Title,
    Id,
}

impl SortField {
    /// Lenient parse; anything unknown is `None` so callers can fall back
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "score" => Some(SortField::Score),
            "published_at" | "date" => Some(SortField::PublishedAt),
            "title" => Some(SortField::Title),
            "id" => Some(SortField::Id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Score => "score",
            SortField::PublishedAt => "published_at",
            SortField::Title => "title",
            SortField::Id => "id",
        }
    }

    /// Column name. Only these strings are ever interpolated into SQL.
    pub fn column(&self) -> &'static str {
        self.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// How the keyword filters titles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordMatch {
    /// Indexed prefix match; every term must start some word of the title
    FullText(Vec<String>),
    /// Case-insensitive substring match
    Substring(String),
}

impl KeywordMatch {
    /// Pick the strategy for `keyword`. Short keywords cannot use the text
    /// index and fall back to substring matching.
    pub fn for_keyword(keyword: &str, min_fulltext_len: usize) -> Option<Self> {
        let trimmed = keyword.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.chars().count() >= min_fulltext_len {
            let terms: Vec<String> = trimmed
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
                .map(|t| t.to_lowercase())
                .collect();
            if !terms.is_empty() {
                return Some(KeywordMatch::FullText(terms));
            }
        }
        Some(KeywordMatch::Substring(trimmed.to_string()))
    }

    /// Postgres `tsquery` text: `term:* & term:*`
    pub fn tsquery(terms: &[String]) -> String {
        terms
            .iter()
            .map(|t| format!("{}:*", t))
            .collect::<Vec<_>>()
            .join(" & ")
    }

    /// `ILIKE` pattern with wildcard characters escaped
    pub fn like_pattern(needle: &str) -> String {
        let escaped = needle
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        format!("%{}%", escaped)
    }

    /// In-process evaluation, mirroring what the database does
    pub fn matches(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        match self {
            KeywordMatch::FullText(terms) => {
                let words: Vec<&str> = title
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .collect();
                terms
                    .iter()
                    .all(|term| words.iter().any(|w| w.starts_with(term.as_str())))
            }
            KeywordMatch::Substring(needle) => title.contains(&needle.to_lowercase()),
        }
    }
}

/// Publication window, `start` inclusive and `end` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Build from calendar days, both inclusive. Inverted bounds are swapped.
    pub fn from_days(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let (start, end) = match (start, end) {
            (Some(s), Some(e)) if e < s => (Some(e), Some(s)),
            other => other,
        };
        Self {
            start: start.map(start_of_day),
            // No next day after the last representable date; leave the end open.
            end: end.and_then(|d| start_of_day(d).checked_add_signed(Duration::days(1))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at < e)
    }
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

/// A fully resolved read query
#[derive(Debug, Clone, PartialEq)]
pub struct ContentQuery {
    pub keyword: Option<KeywordMatch>,
    pub content_type: Option<ContentType>,
    pub provider_id: Option<i64>,
    pub published: DateRange,
    pub sort: SortField,
    pub direction: SortDirection,
    pub limit: u32,
    pub offset: u64,
}

impl Default for ContentQuery {
    fn default() -> Self {
        Self {
            keyword: None,
            content_type: None,
            provider_id: None,
            published: DateRange::default(),
            sort: SortField::default(),
            direction: SortDirection::default(),
            limit: 10,
            offset: 0,
        }
    }
}

impl ContentQuery {
    pub fn with_keyword(mut self, keyword: &str, min_fulltext_len: usize) -> Self {
        self.keyword = KeywordMatch::for_keyword(keyword, min_fulltext_len);
        self
    }

    pub fn with_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn with_provider(mut self, provider_id: i64) -> Self {
        self.provider_id = Some(provider_id);
        self
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.published = range;
        self
    }

    pub fn sorted_by(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort = field;
        self.direction = direction;
        self
    }

    /// One-based page of `per_page` rows
    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.limit = per_page.max(1);
        self.offset = (page.max(1) as u64 - 1) * self.limit as u64;
        self
    }

    /// `ORDER BY` body, always ending with the `id DESC` tie-break
    pub fn order_by(&self) -> String {
        match self.sort {
            SortField::Id => format!("id {}", self.direction.sql()),
            field => format!("{} {}, id DESC", field.column(), self.direction.sql()),
        }
    }
}

impl fmt::Display for ContentQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "keyword={:?} type={:?} provider={:?} order=[{}] limit={} offset={}",
            self.keyword,
            self.content_type,
            self.provider_id,
            self.order_by(),
            self.limit,
            self.offset
        )
    }
}
