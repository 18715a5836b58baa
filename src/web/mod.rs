//! Web server module
//!
//! Provides the JSON API over search, content lookup, provider listing,
//! corpus statistics and the sync trigger.

mod extract;
mod handlers;
mod middleware;
mod response;
mod routes;
mod state;

pub use middleware::client_key;
pub use response::{ApiResponse, ErrorBody, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
