//! Search orchestration module
//!
//! Validates requests, runs them against storage under time budgets,
//! and memoizes the assembled pages.

mod executor;
mod models;

pub use executor::SearchService;
pub use models::*;
