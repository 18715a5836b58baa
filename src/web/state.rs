//! Application state shared across handlers

use crate::config::Settings;
use crate::metrics::Metrics;
use crate::providers::ProviderManager;
use crate::ratelimit::InboundLimiter;
use crate::search::{RequestContext, SearchService};
use crate::storage::{ContentStore, ProviderStore};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub search: Arc<SearchService>,
    pub manager: Arc<ProviderManager>,
    pub providers: Arc<dyn ProviderStore>,
    pub contents: Arc<dyn ContentStore>,
    /// Absent when the inbound limiter is disabled
    pub limiter: Option<Arc<dyn InboundLimiter>>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Context for one inbound request, bounded by the main query budget
    pub fn request_context(&self) -> RequestContext {
        RequestContext::new().with_timeout(self.settings.search.query_timeout())
    }
}
