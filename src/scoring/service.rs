//! Bulk rescoring over stored content

use crate::error::{Error, Result};
use crate::model::Content;
use crate::storage::ContentStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_BATCH_SIZE: u32 = 100;

/// Outcome of a bulk pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RescoreReport {
    pub scored: u64,
    pub failed: u64,
}

/// Recomputes stored scores in bounded batches
#[derive(Clone)]
pub struct ScoringService {
    contents: Arc<dyn ContentStore>,
    batch_size: u32,
}

impl ScoringService {
    pub fn new(contents: Arc<dyn ContentStore>) -> Self {
        Self {
            contents,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Recompute and persist the score of one stored item
    pub async fn rescore_one(&self, content: &Content, now: DateTime<Utc>) -> Result<f64> {
        let score = super::score_at(&content.metrics, content.published_at, now);
        self.contents
            .set_score(content.id, score)
            .await
            .map_err(|e| Error::storage("update score", e))?;
        Ok(score)
    }

    pub async fn rescore_provider(&self, provider_id: i64) -> Result<RescoreReport> {
        info!("Rescoring content of provider {}", provider_id);
        self.rescore(Some(provider_id)).await
    }

    pub async fn rescore_all(&self) -> Result<RescoreReport> {
        info!("Rescoring all content");
        self.rescore(None).await
    }

    async fn rescore(&self, provider_id: Option<i64>) -> Result<RescoreReport> {
        let now = Utc::now();
        let mut report = RescoreReport::default();
        let mut cursor = 0;

        loop {
            let batch = self
                .contents
                .contents_after(provider_id, cursor, self.batch_size)
                .await
                .map_err(|e| Error::storage("load rescore batch", e))?;
            let Some(last) = batch.last() else { break };
            cursor = last.id;

            for content in &batch {
                match self.rescore_one(content, now).await {
                    Ok(_) => report.scored += 1,
                    Err(e) => {
                        warn!("Failed to rescore content {}: {}", content.id, e);
                        report.failed += 1;
                    }
                }
            }
            debug!("Rescored batch of {} ending at id {}", batch.len(), cursor);

            if batch.len() < self.batch_size as usize {
                break;
            }
        }

        info!(
            "Rescoring finished: {} scored, {} failed",
            report.scored, report.failed
        );
        Ok(report)
    }
}
