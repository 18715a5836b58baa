//! Domain model
//!
//! Content items, providers and the helpers that normalize provider input.

mod content;
mod provider;

pub use content::*;
pub use provider::*;
