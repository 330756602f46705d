//! Conditional JSON fetch client.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::HttpSettings;

use super::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// The last failure seen before retries ran out.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("HTTP {0}")]
    Status(StatusCode),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: Url, status: StatusCode },
    #[error("request to {url} failed after {attempts} attempt(s): {cause}")]
    Exhausted {
        url: Url,
        attempts: u32,
        #[source]
        cause: FetchFailure,
    },
    #[error("request to {url} timed out after {after:?}")]
    Timeout { url: Url, after: Duration },
    #[error("malformed JSON from {url}: {source}")]
    MalformedResponse {
        url: Url,
        #[source]
        source: serde_json::Error,
    },
    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// Whether a failed status is worth another attempt.
fn is_transient(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Cache key for a request URI: the URL without its fragment.
pub fn cache_key(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized.into()
}

/// A cached response body together with its parsed document.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub body: Arc<[u8]>,
    pub document: Arc<Value>,
    pub retrieved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Body downloaded and parsed by this request.
    Fetched,
    /// Server answered 304; the cached body was reused.
    Revalidated,
}

#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub url: Url,
    pub entry: Arc<CacheEntry>,
    pub freshness: Freshness,
}

impl FetchedDocument {
    pub fn json(&self) -> &Value {
        &self.entry.document
    }
}

/// Fetches JSON documents with ETag / Last-Modified revalidation and bounded
/// retries. One client is shared by every resource of a source.
#[derive(Debug)]
pub struct DataClient {
    transport: Arc<dyn HttpTransport>,
    settings: HttpSettings,
    cache: DashMap<String, Arc<CacheEntry>>,
}

impl DataClient {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: HttpSettings) -> Self {
        Self {
            transport,
            settings,
            cache: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    pub fn cached(&self, url: &Url) -> Option<Arc<CacheEntry>> {
        self.cache
            .get(&cache_key(url))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// GET `url` and parse the body as JSON.
    ///
    /// The whole call, retries included, is bounded by the configured
    /// timeout. Cancelling drops the in-flight request; nothing is cached for
    /// an incomplete response.
    pub async fn fetch(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<FetchedDocument, FetchError> {
        let budget = self.settings.timeout();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Fetch of {} cancelled", url);
                Err(FetchError::Cancelled)
            }
            outcome = tokio::time::timeout(budget, self.fetch_with_retry(url)) => {
                outcome.unwrap_or_else(|_| {
                    Err(FetchError::Timeout {
                        url: url.clone(),
                        after: budget,
                    })
                })
            }
        }
    }

    async fn fetch_with_retry(&self, url: &Url) -> Result<FetchedDocument, FetchError> {
        let key = cache_key(url);
        let mut attempt: u32 = 0;

        loop {
            let prior = self.cached(url);
            let request = HttpRequest::get(url.clone()).with_validators(prior.as_deref());

            let failure = match self.transport.send(request).await {
                Ok(response) => match response.status {
                    StatusCode::NOT_MODIFIED => {
                        return match prior {
                            Some(prior) => Ok(self.revalidated(url, &key, prior, response)),
                            None => Err(FetchError::Status {
                                url: url.clone(),
                                status: response.status,
                            }),
                        };
                    }
                    status if status.is_success() => {
                        return self.store_fresh(url, key, prior, response);
                    }
                    status if is_transient(status) => FetchFailure::Status(status),
                    status => {
                        return Err(FetchError::Status {
                            url: url.clone(),
                            status,
                        });
                    }
                },
                Err(error) => FetchFailure::Transport(error),
            };

            if attempt >= self.settings.max_retries {
                return Err(FetchError::Exhausted {
                    url: url.clone(),
                    attempts: attempt + 1,
                    cause: failure,
                });
            }

            let delay = self.settings.retry_delay(attempt);
            tracing::debug!(
                "Attempt {} for {} failed ({}); retrying in {:?}",
                attempt + 1,
                url,
                failure,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn store_fresh(
        &self,
        url: &Url,
        key: String,
        prior: Option<Arc<CacheEntry>>,
        response: HttpResponse,
    ) -> Result<FetchedDocument, FetchError> {
        // parse before touching the cache so a bad body never replaces a good entry
        let document: Value =
            serde_json::from_slice(&response.body).map_err(|source| FetchError::MalformedResponse {
                url: url.clone(),
                source,
            })?;

        let entry = Arc::new(CacheEntry {
            key: key.clone(),
            etag: response.etag,
            last_modified: response.last_modified,
            body: Arc::from(response.body),
            document: Arc::new(document),
            retrieved_at: Utc::now(),
        });

        Ok(FetchedDocument {
            url: url.clone(),
            entry: self.publish(key, prior.as_ref(), entry),
            freshness: Freshness::Fetched,
        })
    }

    fn revalidated(
        &self,
        url: &Url,
        key: &str,
        prior: Arc<CacheEntry>,
        response: HttpResponse,
    ) -> FetchedDocument {
        tracing::debug!("{} not modified; reusing cached body", url);

        let refreshed = Arc::new(CacheEntry {
            etag: response.etag.or_else(|| prior.etag.clone()),
            last_modified: response
                .last_modified
                .or_else(|| prior.last_modified.clone()),
            retrieved_at: Utc::now(),
            ..CacheEntry::clone(&prior)
        });

        FetchedDocument {
            url: url.clone(),
            entry: self.publish(key.to_string(), Some(&prior), refreshed),
            freshness: Freshness::Revalidated,
        }
    }

    /// Store `entry` unless another request already replaced the snapshot this
    /// one started from; in that case the earlier writer's entry is returned.
    fn publish(
        &self,
        key: String,
        prior: Option<&Arc<CacheEntry>>,
        entry: Arc<CacheEntry>,
    ) -> Arc<CacheEntry> {
        match self.cache.entry(key) {
            Entry::Occupied(mut occupied) => {
                let unchanged = prior.is_some_and(|prior| Arc::ptr_eq(prior, occupied.get()));
                if unchanged {
                    occupied.insert(Arc::clone(&entry));
                    entry
                } else {
                    Arc::clone(occupied.get())
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&entry));
                entry
            }
        }
    }
}
