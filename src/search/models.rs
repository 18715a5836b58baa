//! Search request, response and per-request context

use crate::cache::cache_key;
use crate::config::SearchSettings;
use crate::error::{Error, Result};
use crate::model::{Content, ContentType};
use crate::query::{ContentQuery, DateRange, SortDirection, SortField};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Raw query-string parameters as received
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(alias = "q")]
    pub query: Option<String>,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub provider_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// A validated, defaulted search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub keyword: Option<String>,
    pub content_type: Option<ContentType>,
    pub provider_id: Option<i64>,
    /// Inclusive on both ends
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: u32,
    pub per_page: u32,
    pub sort: SortField,
    pub direction: SortDirection,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            keyword: None,
            content_type: None,
            provider_id: None,
            start_date: None,
            end_date: None,
            page: 1,
            per_page: 10,
            sort: SortField::default(),
            direction: SortDirection::default(),
        }
    }
}

fn present(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| Error::Validation(format!("{} must be a YYYY-MM-DD date", field)))
}

fn parse_number<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::Validation(format!("{} must be a number", field)))
}

impl SearchRequest {
    /// Validate and default raw parameters.
    ///
    /// Malformed type, provider, dates and numbers are rejected. Unknown
    /// sort fields or directions fall back to score descending. Page and
    /// page size are clamped into range.
    pub fn from_params(params: &SearchParams, settings: &SearchSettings) -> Result<Self> {
        let content_type = present(&params.content_type)
            .map(|raw| {
                raw.parse::<ContentType>().map_err(|_| {
                    Error::Validation(format!("type must be video or article, got '{}'", raw))
                })
            })
            .transpose()?;

        let provider_id = present(&params.provider_id)
            .map(|raw| parse_number::<i64>("provider_id", raw))
            .transpose()?;

        let mut start_date = present(&params.start_date)
            .map(|raw| parse_date("start_date", raw))
            .transpose()?;
        let mut end_date = present(&params.end_date)
            .map(|raw| parse_date("end_date", raw))
            .transpose()?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                start_date = Some(end);
                end_date = Some(start);
            }
        }

        let page = present(&params.page)
            .map(|raw| parse_number::<i64>("page", raw))
            .transpose()?
            .unwrap_or(1)
            .clamp(1, u32::MAX as i64) as u32;

        let max_page_size = settings.max_page_size.max(1);
        let per_page = match present(&params.per_page)
            .map(|raw| parse_number::<i64>("per_page", raw))
            .transpose()?
        {
            Some(n) if n >= 1 => n.min(max_page_size as i64) as u32,
            _ => settings.default_page_size.clamp(1, max_page_size),
        };

        let direction = present(&params.sort_order).and_then(SortDirection::parse);
        let (sort, direction) = match present(&params.sort_by) {
            None => (SortField::default(), direction.unwrap_or_default()),
            Some(raw) => match SortField::parse(raw) {
                Some(field) => (field, direction.unwrap_or_default()),
                None => (SortField::default(), SortDirection::default()),
            },
        };

        Ok(Self {
            keyword: present(&params.query).map(str::to_string),
            content_type,
            provider_id,
            start_date,
            end_date,
            page,
            per_page,
            sort,
            direction,
        })
    }

    /// Storage query for this request
    pub fn to_query(&self, min_fulltext_len: usize) -> ContentQuery {
        let mut query = ContentQuery::default()
            .with_range(DateRange::from_days(self.start_date, self.end_date))
            .sorted_by(self.sort, self.direction)
            .page(self.page, self.per_page);
        if let Some(keyword) = &self.keyword {
            query = query.with_keyword(keyword, min_fulltext_len);
        }
        if let Some(content_type) = self.content_type {
            query = query.with_type(content_type);
        }
        if let Some(provider_id) = self.provider_id {
            query = query.with_provider(provider_id);
        }
        query
    }

    /// Key that is equal for two requests exactly when every filter, sort
    /// and paging field is equal
    pub fn cache_key(&self) -> String {
        let keyword = self
            .keyword
            .as_deref()
            .map(|k| k.trim().to_lowercase())
            .unwrap_or_default();
        let content_type = self.content_type.map(|t| t.as_str()).unwrap_or("");
        let provider = self.provider_id.map(|p| p.to_string()).unwrap_or_default();
        let start = self.start_date.map(|d| d.to_string()).unwrap_or_default();
        let end = self.end_date.map(|d| d.to_string()).unwrap_or_default();
        let page = self.page.to_string();
        let per_page = self.per_page.to_string();

        cache_key(
            "search",
            &[
                keyword.as_str(),
                content_type,
                provider.as_str(),
                start.as_str(),
                end.as_str(),
                page.as_str(),
                per_page.as_str(),
                self.sort.as_str(),
                self.direction.as_str(),
            ],
        )
    }
}

/// A page of results. `total` is `None` when counting ran out of time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<Content>,
    pub total: Option<u64>,
    pub page: u32,
    pub per_page: u32,
    /// Zero when the total is unknown
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl SearchResponse {
    pub fn assemble(results: Vec<Content>, total: Option<u64>, page: u32, per_page: u32) -> Self {
        let per_page_wide = per_page.max(1) as u64;
        let total_pages = match total {
            Some(total) => total.div_ceil(per_page_wide),
            None => 0,
        };
        let has_next = match total {
            Some(_) => (page as u64) < total_pages,
            // a full page suggests there may be more
            None => results.len() as u64 == per_page_wide,
        };

        Self {
            results,
            total,
            page,
            per_page,
            total_pages,
            has_next,
            has_prev: page > 1,
        }
    }
}

/// Per-request identity and deadline, threaded into every storage and
/// cache call the search makes
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// The smaller of `budget` and the time left before the deadline
    pub fn budget(&self, budget: Duration) -> Duration {
        match self.deadline {
            Some(deadline) => budget.min(deadline.saturating_duration_since(Instant::now())),
            None => budget,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> SearchParams {
        let mut params = SearchParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "query" => params.query = value,
                "type" => params.content_type = value,
                "provider_id" => params.provider_id = value,
                "start_date" => params.start_date = value,
                "end_date" => params.end_date = value,
                "page" => params.page = value,
                "per_page" => params.per_page = value,
                "sort_by" => params.sort_by = value,
                "sort_order" => params.sort_order = value,
                other => panic!("unknown parameter {other}"),
            }
        }
        params
    }

    #[test]
    fn test_defaults() {
        let req = SearchRequest::from_params(&SearchParams::default(), &SearchSettings::default())
            .unwrap();
        assert_eq!(req, SearchRequest::default());
    }

    #[test]
    fn test_far_future_end_date_is_open_ended() {
        let last = NaiveDate::MAX.format("%Y-%m-%d").to_string();
        let req = SearchRequest::from_params(
            &params(&[("start_date", "2024-01-01"), ("end_date", last.as_str())]),
            &SearchSettings::default(),
        )
        .unwrap();
        let query = req.to_query(3);
        assert!(query.published.start.is_some());
        assert_eq!(query.published.end, None);
    }

    #[test]
    fn test_clamps_and_fallbacks() {
        let settings = SearchSettings::default();
        let req = SearchRequest::from_params(
            &params(&[
                ("page", "0"),
                ("per_page", "500"),
                ("sort_by", "views; DROP TABLE contents"),
                ("sort_order", "asc"),
            ]),
            &settings,
        )
        .unwrap();
        assert_eq!(req.page, 1);
        assert_eq!(req.per_page, settings.max_page_size);
        assert_eq!(req.sort, SortField::Score);
        assert_eq!(req.direction, SortDirection::Desc);

        let req = SearchRequest::from_params(
            &params(&[("sort_by", "title"), ("sort_order", "sideways")]),
            &settings,
        )
        .unwrap();
        assert_eq!(req.sort, SortField::Title);
        assert_eq!(req.direction, SortDirection::Desc);
    }

    #[test]
    fn test_rejects_malformed_filters() {
        let settings = SearchSettings::default();
        for bad in [
            params(&[("type", "podcast")]),
            params(&[("provider_id", "abc")]),
            params(&[("start_date", "2024-13-01")]),
            params(&[("page", "two")]),
        ] {
            let err = SearchRequest::from_params(&bad, &settings).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{:?}", bad);
        }
    }

    #[test]
    fn test_inverted_dates_are_swapped() {
        let req = SearchRequest::from_params(
            &params(&[("start_date", "2024-03-31"), ("end_date", "2024-03-01")]),
            &SearchSettings::default(),
        )
        .unwrap();
        assert!(req.start_date < req.end_date);
    }

    #[test]
    fn test_cache_key_covers_every_field() {
        let base = SearchRequest {
            keyword: Some("Rust".into()),
            ..SearchRequest::default()
        };
        let same = SearchRequest {
            keyword: Some(" rust ".into()),
            ..SearchRequest::default()
        };
        assert_eq!(base.cache_key(), same.cache_key());

        let variants = [
            SearchRequest { page: 2, ..base.clone() },
            SearchRequest { per_page: 20, ..base.clone() },
            SearchRequest { content_type: Some(ContentType::Video), ..base.clone() },
            SearchRequest { provider_id: Some(1), ..base.clone() },
            SearchRequest { start_date: NaiveDate::from_ymd_opt(2024, 1, 1), ..base.clone() },
            SearchRequest { end_date: NaiveDate::from_ymd_opt(2024, 1, 1), ..base.clone() },
            SearchRequest { sort: SortField::Title, ..base.clone() },
            SearchRequest { direction: SortDirection::Asc, ..base.clone() },
        ];
        for variant in &variants {
            assert_ne!(variant.cache_key(), base.cache_key(), "{:?}", variant);
        }
    }

    #[test]
    fn test_total_pages() {
        let known = SearchResponse::assemble(Vec::new(), Some(21), 2, 10);
        assert_eq!(known.total_pages, 3);
        assert!(known.has_next);
        assert!(known.has_prev);

        let last = SearchResponse::assemble(Vec::new(), Some(20), 2, 10);
        assert!(!last.has_next);

        let unknown = SearchResponse::assemble(Vec::new(), None, 1, 10);
        assert_eq!(unknown.total_pages, 0);
        assert!(!unknown.has_next);
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_budget_shrinks_toward_deadline() {
        let ctx = RequestContext::new().with_timeout(Duration::from_secs(3));
        assert_eq!(ctx.budget(Duration::from_secs(10)), Duration::from_secs(3));
        assert_eq!(ctx.budget(Duration::from_secs(1)), Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(ctx.is_expired());
        assert_eq!(ctx.budget(Duration::from_secs(1)), Duration::ZERO);
    }
}
