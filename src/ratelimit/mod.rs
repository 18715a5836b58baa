//! Rate limiting
//!
//! Outbound requests to each provider go through a [`TokenBucket`]. Inbound
//! API traffic is admitted per client by an [`InboundLimiter`].

mod sliding_window;
mod token_bucket;

pub use sliding_window::{InboundLimiter, LocalKeyedLimiter, RateDecision, RedisWindowLimiter};
pub use token_bucket::TokenBucket;
