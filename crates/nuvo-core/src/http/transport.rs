//! Pluggable HTTP transport.
//!
//! The fetch client never talks to the network directly. It hands an
//! [`HttpRequest`] to an [`HttpTransport`], which owns proxy, credential and
//! TLS concerns. [`ReqwestTransport`] is the default implementation.

use std::fmt;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use thiserror::Error;
use url::Url;

use crate::config::HttpSettings;
use crate::resource::Credentials;

use super::CacheEntry;

/// A GET request, optionally carrying cache validators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: Url,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            if_none_match: None,
            if_modified_since: None,
        }
    }

    /// Attach the validators of a previously cached response.
    pub fn with_validators(mut self, prior: Option<&CacheEntry>) -> Self {
        if let Some(entry) = prior {
            self.if_none_match = entry.etag.clone();
            self.if_modified_since = entry.last_modified.clone();
        }
        self
    }

    pub fn is_conditional(&self) -> bool {
        self.if_none_match.is_some() || self.if_modified_since.is_some()
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            etag: None,
            last_modified: None,
            body: body.into(),
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

impl TransportError {
    fn classify(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_connect() {
            TransportError::Connect(error.to_string())
        } else {
            TransportError::Request(error)
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync + fmt::Debug {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    credentials: Option<Credentials>,
}

impl ReqwestTransport {
    pub fn new(settings: &HttpSettings, credentials: Option<Credentials>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(settings.user_agent.as_str());

        if let Some(proxy) = &settings.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .with_context(|| format!("Invalid proxy URL: {}", proxy))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            credentials,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .get(request.url.clone())
            .header(ACCEPT, "application/json");

        if let Some(etag) = &request.if_none_match {
            builder = builder.header(IF_NONE_MATCH, etag);
        }
        if let Some(since) = &request.if_modified_since {
            builder = builder.header(IF_MODIFIED_SINCE, since);
        }
        if let Some(credentials) = &self.credentials {
            builder = builder.basic_auth(&credentials.username, credentials.password.as_ref());
        }

        let response = builder.send().await.map_err(TransportError::classify)?;

        let status = response.status();
        let header = |name| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let etag = header(ETAG);
        let last_modified = header(LAST_MODIFIED);

        let body = response
            .bytes()
            .await
            .map_err(TransportError::classify)?
            .to_vec();

        Ok(HttpResponse {
            status,
            etag,
            last_modified,
            body,
        })
    }
}
