//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

use nuvo_core::http::{HttpRequest, HttpResponse, HttpTransport, TransportError};

pub const INDEX_URL: &str = "https://packages.test/v3/index.json";
pub const REGISTRATION_BASE: &str = "https://packages.test/v3/registration5/";

/// A fixed set of documents served with a `Last-Modified` validator.
#[derive(Debug, Default)]
pub struct StaticFeed {
    documents: Mutex<HashMap<String, String>>,
    offline: Mutex<Vec<String>>,
    requests: Mutex<Vec<HttpRequest>>,
}

const LAST_MODIFIED: &str = "Tue, 01 Oct 2024 10:00:00 GMT";

impl StaticFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed whose service index advertises one registration endpoint.
    pub fn with_service_index() -> Self {
        let feed = Self::new();
        feed.serve(
            INDEX_URL,
            json!({
                "version": "3.0.0",
                "resources": [
                    { "@id": REGISTRATION_BASE, "@type": "RegistrationsBaseUrl/3.6.0" },
                    { "@id": "https://packages.test/v3/query", "@type": "SearchQueryService" }
                ]
            }),
        );
        feed
    }

    pub fn serve(&self, url: &str, document: Value) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), document.to_string());
    }

    /// Requests to `url` fail at the connection level.
    pub fn take_offline(&self, url: &str) {
        self.offline.lock().unwrap().push(url.to_string());
    }

    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.as_str() == url)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HttpTransport for StaticFeed {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut url = request.url.clone();
        url.set_fragment(None);
        let key = url.to_string();

        if self.offline.lock().unwrap().contains(&key) {
            return Err(TransportError::Connect(format!("{key} is offline")));
        }

        let Some(body) = self.documents.lock().unwrap().get(&key).cloned() else {
            return Ok(HttpResponse::new(StatusCode::NOT_FOUND, Vec::new()));
        };

        if request.if_modified_since.as_deref() == Some(LAST_MODIFIED) {
            return Ok(HttpResponse::new(StatusCode::NOT_MODIFIED, Vec::new()));
        }

        let mut response = HttpResponse::new(StatusCode::OK, body);
        response.last_modified = Some(LAST_MODIFIED.to_string());
        Ok(response)
    }
}

pub fn catalog_leaf(id: &str, version: &str, listed: bool) -> Value {
    let lower = id.to_lowercase();
    json!({
        "@id": format!("{REGISTRATION_BASE}{lower}/{version}.json"),
        "catalogEntry": {
            "@id": format!("https://packages.test/v3/catalog0/{lower}.{version}.json"),
            "id": id,
            "version": version,
            "listed": listed,
            "authors": "Example Authors",
            "description": format!("{id} {version}"),
            "tags": ["example", "test"],
            "published": "2024-06-01T12:00:00.000+00:00",
            "dependencyGroups": [
                {
                    "targetFramework": "net8.0",
                    "dependencies": [ { "id": "Dep.One", "range": "[1.0.0, )" } ]
                }
            ]
        },
        "packageContent": format!("https://packages.test/v3-flatcontainer/{lower}/{version}/{lower}.{version}.nupkg")
    })
}
