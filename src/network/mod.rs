//! HTTP networking module
//!
//! Outbound HTTP used by provider adapters.

mod client;

pub use client::{FetchResponse, HttpClient};
