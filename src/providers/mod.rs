//! Content providers
//!
//! Each adapter pulls one feed in its own wire format and normalizes the
//! items into [`ContentDraft`](crate::model::ContentDraft)s. The
//! [`ProviderManager`] pairs adapters with rate limiters and persists
//! what they return.

mod json;
mod loader;
mod manager;
mod traits;
mod xml;

pub use json::JsonAdapter;
pub use loader::AdapterLoader;
pub use manager::{ensure_providers, ProviderManager, SyncReport};
pub use traits::{FetchError, ProviderAdapter};
pub use xml::XmlAdapter;
