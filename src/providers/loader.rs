//! Adapter loader for building provider adapters from configuration

use super::json::JsonAdapter;
use super::traits::ProviderAdapter;
use super::xml::XmlAdapter;
use crate::model::{ProviderFormat, ProviderSpec};
use crate::network::HttpClient;
use std::sync::Arc;

pub struct AdapterLoader;

impl AdapterLoader {
    /// Create the adapter matching the provider's wire format
    pub fn create_adapter(spec: &ProviderSpec, client: HttpClient) -> Arc<dyn ProviderAdapter> {
        match spec.format {
            ProviderFormat::Json => Arc::new(JsonAdapter::new(&spec.name, &spec.url, client)),
            ProviderFormat::Xml => Arc::new(XmlAdapter::new(&spec.name, &spec.url, client)),
        }
    }

    /// Build one adapter per spec, sharing the connection pool
    pub fn load(specs: &[ProviderSpec], client: &HttpClient) -> Vec<Arc<dyn ProviderAdapter>> {
        specs
            .iter()
            .map(|spec| Self::create_adapter(spec, client.clone()))
            .collect()
    }

    pub fn available_formats() -> Vec<&'static str> {
        vec![ProviderFormat::Json.as_str(), ProviderFormat::Xml.as_str()]
    }
}
