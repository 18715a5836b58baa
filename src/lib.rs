//! Content aggregator: multi-provider ingestion, scoring and search
//!
//! Providers are pulled under per-provider rate limits, normalized into one
//! content model and upserted idempotently. Every item carries a
//! deterministic score. Reads go through a cached search service that
//! degrades to an unknown total when counting is too slow.

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod network;
pub mod providers;
pub mod query;
pub mod ratelimit;
pub mod scoring;
pub mod search;
pub mod storage;
pub mod web;

pub use config::Settings;
pub use error::{Error, ErrorKind, Result};
pub use providers::{ProviderAdapter, ProviderManager};
pub use search::{SearchRequest, SearchResponse, SearchService};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
