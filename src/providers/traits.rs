//! Provider adapter trait and shared types

use crate::model::{ContentDraft, ProviderFormat};
use crate::network::HttpClient;
use async_trait::async_trait;

/// Why a provider fetch failed as a whole
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("unexpected status code {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(err)
        }
    }
}

/// Source of content in one wire format.
///
/// Implementors decode a payload into drafts; the default `fetch` issues a
/// single GET and hands the body to `parse`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn url(&self) -> &str;

    fn format(&self) -> ProviderFormat;

    fn client(&self) -> &HttpClient;

    /// Decode a whole payload. Items that fail to normalize are dropped.
    fn parse(&self, body: &str) -> Result<Vec<ContentDraft>, FetchError>;

    async fn fetch(&self) -> Result<Vec<ContentDraft>, FetchError> {
        let response = self.client().get(self.url()).await?;
        if response.status != 200 {
            return Err(FetchError::Status(response.status));
        }
        self.parse(&response.text)
    }
}

/// Integer that may arrive as a number, a numeric string, blank or missing
pub(crate) fn lenient_count(raw: Option<&str>) -> Result<u64, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(0),
        Some(s) => s
            .parse::<u64>()
            .map_err(|_| format!("'{}' is not a non-negative integer", s)),
    }
}
