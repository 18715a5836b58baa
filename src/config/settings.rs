//! Settings structures for the aggregator

use crate::model::{ProviderFormat, ProviderSpec};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Main settings structure, loaded from `settings.yml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub redis: Option<RedisSettings>,
    pub search: SearchSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub outgoing: OutgoingSettings,
    pub sync: SyncSettings,
    pub providers: Vec<ProviderSpec>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            redis: None,
            search: SearchSettings::default(),
            cache: CacheSettings::default(),
            rate_limit: RateLimitSettings::default(),
            outgoing: OutgoingSettings::default(),
            sync: SyncSettings::default(),
            providers: default_providers(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// Merge with environment variables
    pub fn merge_env(&mut self) {
        self.merge_vars(|key| std::env::var(key).ok());
    }

    /// Merge overrides from `lookup`, which maps a variable name to its value
    pub fn merge_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("AGGREGATOR_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Some(val) = lookup("AGGREGATOR_BIND_ADDRESS") {
            self.server.bind_address = val;
        }
        if let Some(val) = lookup("DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = lookup("REDIS_URL") {
            self.redis = if val.trim().is_empty() {
                None
            } else {
                Some(RedisSettings { url: val })
            };
        }
        if let Some(val) = lookup("AGGREGATOR_CACHE_BACKEND") {
            match val.to_ascii_lowercase().as_str() {
                "redis" => self.cache.backend = CacheBackend::Redis,
                "local" => self.cache.backend = CacheBackend::Local,
                _ => {}
            }
        }
        if let Some(val) = lookup("AGGREGATOR_SEARCH_MIN_FULLTEXT_LENGTH") {
            if let Ok(n) = val.parse() {
                self.search.min_fulltext_length = n;
            }
        }
        if let Some(val) = lookup("AGGREGATOR_SEARCH_CACHE_TTL_SECONDS") {
            if let Ok(n) = val.parse() {
                self.search.cache_ttl_secs = n;
            }
        }
        if let Some(val) = lookup("AGGREGATOR_RATE_LIMIT_REQUESTS_PER_MINUTE") {
            if let Ok(n) = val.parse() {
                self.rate_limit.requests_per_minute = n;
            }
        }
        if let Some(val) = lookup("AGGREGATOR_SYNC_ON_STARTUP") {
            self.sync.on_startup = val.parse().unwrap_or(self.sync.on_startup);
        }
        for provider in self.providers.iter_mut() {
            let key = format!(
                "AGGREGATOR_PROVIDER_{}_URL",
                provider.name.to_ascii_uppercase().replace('-', "_")
            );
            if let Some(url) = lookup(&key) {
                provider.url = url;
            }
        }
    }

    /// Reject settings the services cannot run with
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for provider in &self.providers {
            provider.validate().map_err(anyhow::Error::msg)?;
            if !names.insert(provider.name.as_str()) {
                anyhow::bail!("provider '{}' is configured twice", provider.name);
            }
        }
        if self.search.max_page_size == 0 {
            anyhow::bail!("search.max_page_size must be at least 1");
        }
        if self.cache.backend == CacheBackend::Redis && self.redis.is_none() {
            anyhow::bail!("cache.backend is redis but no redis url is configured");
        }
        Ok(())
    }

    /// Get provider config by name
    pub fn get_provider(&self, name: &str) -> Option<&ProviderSpec> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Server port
    pub port: u16,
    /// Bind address
    pub bind_address: String,
    /// Enable the inbound rate limiter
    pub limiter: bool,
    /// Method to determine real IP
    pub real_ip_method: RealIpMethod,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "127.0.0.1".to_string(),
            limiter: true,
            real_ip_method: RealIpMethod::default(),
        }
    }
}

/// Method to determine real client IP
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealIpMethod {
    /// Use X-Forwarded-For header
    XForwardedFor,
    /// Use X-Real-IP header
    XRealIp,
    /// Use connection IP directly
    #[default]
    Connection,
}

/// Database settings. An empty URL selects the in-memory store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            run_migrations: true,
        }
    }
}

impl DatabaseSettings {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Redis/Valkey settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

/// Search behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Keywords at least this long use the full-text index
    pub min_fulltext_length: usize,
    /// How long assembled responses stay cached
    pub cache_ttl_secs: u64,
    /// Budget for the page query (seconds)
    pub query_timeout_secs: f64,
    /// Budget for the total count (seconds)
    pub count_timeout_secs: f64,
    /// Budget for small lookups such as tags (seconds)
    pub simple_query_timeout_secs: f64,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            min_fulltext_length: 3,
            cache_ttl_secs: 60,
            query_timeout_secs: 15.0,
            count_timeout_secs: 10.0,
            simple_query_timeout_secs: 5.0,
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

impl SearchSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        secs(self.query_timeout_secs)
    }

    pub fn count_timeout(&self) -> Duration {
        secs(self.count_timeout_secs)
    }

    pub fn simple_query_timeout(&self) -> Duration {
        secs(self.simple_query_timeout_secs)
    }
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.001))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Local,
    Redis,
}

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    /// TTL applied when a caller passes none (seconds)
    pub default_ttl_secs: u64,
    /// Interval of the local expiry sweep (seconds)
    pub sweep_interval_secs: u64,
    pub max_capacity: u64,
    /// Per-operation budget for the remote backend (milliseconds)
    pub remote_timeout_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Local,
            default_ttl_secs: 300,
            sweep_interval_secs: 60,
            max_capacity: 10_000,
            remote_timeout_ms: 500,
        }
    }
}

/// Inbound rate limit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub window_secs: u64,
    /// Budget for one check against Redis (milliseconds)
    pub redis_timeout_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            window_secs: 60,
            redis_timeout_ms: 100,
        }
    }
}

/// Outgoing request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSettings {
    /// Default request timeout in seconds
    pub request_timeout: f64,
    /// Pool max size
    pub pool_maxsize: usize,
    /// Verify SSL certificates
    pub verify_ssl: bool,
    /// Proxy settings
    pub proxies: ProxySettings,
    pub user_agent: String,
}

impl Default for OutgoingSettings {
    fn default() -> Self {
        Self {
            request_timeout: 30.0,
            pool_maxsize: 20,
            verify_ssl: true,
            proxies: ProxySettings::default(),
            user_agent: format!("content-aggregator/{}", crate::VERSION),
        }
    }
}

/// Proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub all: Option<String>,
}

/// Ingestion scheduling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Run one sync when the server starts
    pub on_startup: bool,
    /// Re-sync every this many seconds, if set
    pub interval_secs: Option<u64>,
}

fn default_providers() -> Vec<ProviderSpec> {
    vec![
        ProviderSpec::new(
            "provider1",
            "https://raw.githubusercontent.com/WEG-Technology/mock/refs/heads/main/v2/provider1",
            ProviderFormat::Json,
        ),
        ProviderSpec::new(
            "provider2",
            "https://raw.githubusercontent.com/WEG-Technology/mock/refs/heads/main/v2/provider2",
            ProviderFormat::Xml,
        ),
    ]
}
