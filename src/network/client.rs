//! HTTP client used to pull provider feeds

use crate::config::OutgoingSettings;
use reqwest::Client;
use std::time::Duration;

/// Status and body of a completed GET
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub url: String,
    pub text: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client wrapper with pooled connections and a default timeout
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    default_timeout: Duration,
    user_agent: String,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> reqwest::Result<Self> {
        Self::with_settings(&OutgoingSettings::default())
    }

    /// Create a new HTTP client with custom settings
    pub fn with_settings(settings: &OutgoingSettings) -> reqwest::Result<Self> {
        let timeout = Duration::from_secs_f64(settings.request_timeout.max(0.1));
        let mut builder = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(settings.pool_maxsize)
            .gzip(true)
            .brotli(true);

        if !settings.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ref proxy_url) = settings.proxies.all {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        } else {
            if let Some(ref http) = settings.proxies.http {
                builder = builder.proxy(reqwest::Proxy::http(http)?);
            }
            if let Some(ref https) = settings.proxies.https {
                builder = builder.proxy(reqwest::Proxy::https(https)?);
            }
        }

        Ok(Self {
            client: builder.build()?,
            default_timeout: timeout,
            user_agent: settings.user_agent.clone(),
        })
    }

    /// GET `url` under the default timeout
    pub async fn get(&self, url: &str) -> reqwest::Result<FetchResponse> {
        self.get_with_timeout(url, self.default_timeout).await
    }

    pub async fn get_with_timeout(&self, url: &str, timeout: Duration) -> reqwest::Result<FetchResponse> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/json, application/xml;q=0.9, */*;q=0.8")
            .send()
            .await?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let text = response.text().await?;

        Ok(FetchResponse { status, url, text })
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}
