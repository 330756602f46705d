//! Service index model
//!
//! A package source publishes a service index: a JSON document mapping
//! service types to the endpoints that implement them.
//!
//! ```json
//! {
//!   "version": "3.0.0",
//!   "resources": [
//!     { "@id": "https://api.example/registration/", "@type": "RegistrationsBaseUrl/3.6.0" }
//!   ]
//! }
//! ```

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Well-known service types.
pub mod service_types {
    pub const REGISTRATIONS_BASE_URL: &str = "RegistrationsBaseUrl";
    pub const SEARCH_QUERY_SERVICE: &str = "SearchQueryService";
    pub const PACKAGE_BASE_ADDRESS: &str = "PackageBaseAddress";
    pub const CATALOG: &str = "Catalog";
    pub const PACKAGE_PUBLISH: &str = "PackagePublish";
}

#[derive(Debug, Error)]
pub enum ServiceIndexError {
    #[error("service index is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported service index version '{0}'")]
    UnsupportedVersion(String),
}

#[derive(Debug, Deserialize)]
struct ServiceIndexDocument {
    version: String,
    resources: Vec<ServiceEntryDocument>,
}

#[derive(Debug, Deserialize)]
struct ServiceEntryDocument {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    types: ServiceTypes,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServiceTypes {
    Single(String),
    Multiple(Vec<String>),
}

impl ServiceTypes {
    fn into_vec(self) -> Vec<String> {
        match self {
            ServiceTypes::Single(t) => vec![t],
            ServiceTypes::Multiple(ts) => ts,
        }
    }
}

/// Immutable map from service type to endpoints, in declared order.
#[derive(Debug, Clone, Default)]
pub struct ServiceIndex {
    version: String,
    endpoints: HashMap<String, Vec<Url>>,
}

impl ServiceIndex {
    pub fn parse(json: &str) -> Result<Self, ServiceIndexError> {
        let document: ServiceIndexDocument = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    pub fn from_value(value: &Value) -> Result<Self, ServiceIndexError> {
        let document = ServiceIndexDocument::deserialize(value)?;
        Self::from_document(document)
    }

    /// Build an index directly from a type -> endpoints mapping.
    pub fn from_endpoints<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<Url>)>,
        S: Into<String>,
    {
        let mut index = Self {
            version: "3.0.0".to_string(),
            endpoints: HashMap::new(),
        };
        for (service_type, urls) in entries {
            let service_type = service_type.into();
            for url in urls {
                index.insert(&service_type, url);
            }
        }
        index
    }

    fn from_document(document: ServiceIndexDocument) -> Result<Self, ServiceIndexError> {
        let major = document.version.trim().split('.').next().unwrap_or_default();
        if major != "3" {
            return Err(ServiceIndexError::UnsupportedVersion(document.version));
        }

        let mut index = Self {
            version: document.version,
            endpoints: HashMap::new(),
        };

        for entry in document.resources {
            let url = match Url::parse(entry.id.trim()) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("Skipping service index entry '{}': {}", entry.id, e);
                    continue;
                }
            };
            for service_type in entry.types.into_vec() {
                index.insert(&service_type, url.clone());
            }
        }

        Ok(index)
    }

    /// Register `url` under its full type and, for `Type/version`, under the
    /// bare type as well.
    fn insert(&mut self, service_type: &str, url: Url) {
        let service_type = service_type.trim();
        if let Some((base, _)) = service_type.split_once('/') {
            push_unique(self.endpoints.entry(base.to_string()).or_default(), url.clone());
        }
        push_unique(
            self.endpoints.entry(service_type.to_string()).or_default(),
            url,
        );
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Endpoints for `service_type`, first listed preferred. Empty when the
    /// source does not offer the service.
    pub fn lookup(&self, service_type: &str) -> &[Url] {
        self.endpoints
            .get(service_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn exists(&self, service_type: &str) -> bool {
        !self.lookup(service_type).is_empty()
    }

    /// Every declared service type, sorted.
    pub fn service_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.endpoints.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

fn push_unique(urls: &mut Vec<Url>, url: Url) {
    if !urls.contains(&url) {
        urls.push(url);
    }
}
