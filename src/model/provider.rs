//! Provider metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire format a provider serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFormat {
    Json,
    Xml,
}

impl ProviderFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderFormat::Json => "json",
            ProviderFormat::Xml => "xml",
        }
    }

    /// Lenient parse, falling back to JSON
    pub fn normalize(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "xml" => ProviderFormat::Xml,
            _ => ProviderFormat::Json,
        }
    }
}

impl fmt::Display for ProviderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered provider row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub format: ProviderFormat,
    pub rate_limit_per_minute: u32,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Configuration-driven description of a provider, used for bootstrap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub url: String,
    pub format: ProviderFormat,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
}

fn default_rate_limit() -> u32 {
    60
}

impl ProviderSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>, format: ProviderFormat) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            format,
            rate_limit_per_minute: default_rate_limit(),
        }
    }

    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit_per_minute = per_minute;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("provider name is required".to_string());
        }
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| format!("provider '{}' has an invalid url: {}", self.name, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!(
                "provider '{}' url must use http or https",
                self.name
            ));
        }
        if self.rate_limit_per_minute < 1 {
            return Err(format!(
                "provider '{}' rate limit must be at least 1",
                self.name
            ));
        }
        Ok(())
    }
}
