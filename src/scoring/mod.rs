//! Content scoring
//!
//! `score = base * type_coefficient + freshness + engagement`
//!
//! | component   | video                      | article                               |
//! |-------------|----------------------------|---------------------------------------|
//! | base        | `views / 1000 + likes / 100` | `reading_time + reactions / 50`     |
//! | coefficient | 1.5                        | 1.0                                   |
//! | engagement  | `likes / views * 10`       | `reactions / reading_time * 5`        |
//!
//! Freshness depends only on whole days of age: up to 7 days +5, up to 30
//! days +3, up to 90 days +1, older +0.

mod service;

pub use service::{RescoreReport, ScoringService};

use crate::model::{ContentType, Metrics};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const VIDEO_COEFFICIENT: f64 = 1.5;
pub const ARTICLE_COEFFICIENT: f64 = 1.0;

/// Individual score components, kept for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub base: f64,
    pub coefficient: f64,
    pub freshness: f64,
    pub engagement: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.base * self.coefficient + self.freshness + self.engagement
    }
}

pub fn type_coefficient(content_type: ContentType) -> f64 {
    match content_type {
        ContentType::Video => VIDEO_COEFFICIENT,
        ContentType::Article => ARTICLE_COEFFICIENT,
    }
}

pub fn base_score(metrics: &Metrics) -> f64 {
    match *metrics {
        Metrics::Video { views, likes, .. } => views as f64 / 1000.0 + likes as f64 / 100.0,
        Metrics::Article {
            reading_time,
            reactions,
            ..
        } => reading_time.unwrap_or(0) as f64 + reactions as f64 / 50.0,
    }
}

/// Zero whenever the denominator is zero or absent
pub fn engagement_score(metrics: &Metrics) -> f64 {
    match *metrics {
        Metrics::Video { views, likes, .. } => {
            if views == 0 {
                0.0
            } else {
                likes as f64 / views as f64 * 10.0
            }
        }
        Metrics::Article {
            reading_time,
            reactions,
            ..
        } => match reading_time {
            Some(minutes) if minutes > 0 => reactions as f64 / minutes as f64 * 5.0,
            _ => 0.0,
        },
    }
}

/// Step function over whole days of age. Future timestamps count as fresh.
pub fn freshness_score(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    match (now - published_at).num_days() {
        d if d <= 7 => 5.0,
        d if d <= 30 => 3.0,
        d if d <= 90 => 1.0,
        _ => 0.0,
    }
}

pub fn breakdown_at(metrics: &Metrics, published_at: DateTime<Utc>, now: DateTime<Utc>) -> ScoreBreakdown {
    ScoreBreakdown {
        base: base_score(metrics),
        coefficient: type_coefficient(metrics.content_type()),
        freshness: freshness_score(published_at, now),
        engagement: engagement_score(metrics),
    }
}

/// Score as of `now`
pub fn score_at(metrics: &Metrics, published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    breakdown_at(metrics, published_at, now).total()
}

/// Score as of the current instant
pub fn score(metrics: &Metrics, published_at: DateTime<Utc>) -> f64 {
    score_at(metrics, published_at, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, TimeZone};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_video_scenario() {
        let metrics = Metrics::Video {
            views: 50_000,
            likes: 2_500,
            duration_seconds: Some(930),
        };
        let published = now() - Duration::days(3);
        let b = breakdown_at(&metrics, published, now());
        assert!(close(b.base, 75.0));
        assert!(close(b.engagement, 0.5));
        assert!(close(score_at(&metrics, published, now()), 118.0));
    }

    #[test]
    fn test_article_scenarios() {
        let metrics = Metrics::Article {
            reading_time: Some(10),
            reactions: 500,
            comments: 3,
        };
        let b = breakdown_at(&metrics, now(), now());
        assert!(close(b.base, 20.0));
        assert!(close(b.engagement, 250.0));

        let twenty_days = now() - Duration::days(20);
        assert!(close(score_at(&metrics, twenty_days, now()), 273.0));

        let forty_five_days = now() - Duration::days(45);
        assert!(close(score_at(&metrics, forty_five_days, now()), 271.0));
    }

    #[test]
    fn test_freshness_boundaries() {
        let at = |days: i64, hours: i64| now() - Duration::days(days) - Duration::hours(hours);
        assert_eq!(freshness_score(at(0, 0), now()), 5.0);
        assert_eq!(freshness_score(at(7, 23), now()), 5.0);
        assert_eq!(freshness_score(at(8, 0), now()), 3.0);
        assert_eq!(freshness_score(at(30, 0), now()), 3.0);
        assert_eq!(freshness_score(at(31, 0), now()), 1.0);
        assert_eq!(freshness_score(at(90, 0), now()), 1.0);
        assert_eq!(freshness_score(at(91, 0), now()), 0.0);
        assert_eq!(freshness_score(now() + Duration::days(2), now()), 5.0);
    }

    #[test]
    fn test_freshness_ignores_timezone() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let local = tz.with_ymd_and_hms(2024, 5, 20, 8, 0, 0).unwrap();
        let utc = local.with_timezone(&Utc);
        assert_eq!(freshness_score(utc, now()), 3.0);
    }

    #[test]
    fn test_engagement_zero_denominators() {
        let video = Metrics::Video {
            views: 0,
            likes: 10,
            duration_seconds: None,
        };
        assert_eq!(engagement_score(&video), 0.0);

        let untimed = Metrics::Article {
            reading_time: None,
            reactions: 10,
            comments: 0,
        };
        let zero = Metrics::Article {
            reading_time: Some(0),
            reactions: 10,
            comments: 0,
        };
        assert_eq!(engagement_score(&untimed), 0.0);
        assert_eq!(engagement_score(&zero), 0.0);
        assert!(score_at(&zero, now(), now()).is_finite());
    }
}
