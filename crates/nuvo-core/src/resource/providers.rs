//! Built-in providers for the HTTP handler and service index capabilities.

use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::http::{FetchError, HttpHandlerResource, HttpTransport, ReqwestTransport};
use crate::service_index::ServiceIndex;

use super::{
    Capability, ProviderError, ProviderPosition, Resource, ResourceHandle, ResourceProvider,
    SourceRepository, handle,
};

/// Produces the per-source [`HttpHandlerResource`].
///
/// Without an explicit transport a reqwest client is built from the source's
/// HTTP settings and credentials. A provider given an explicit transport is
/// tried before the built-in one.
#[derive(Debug, Default)]
pub struct HttpHandlerResourceProvider {
    transport: Option<Arc<dyn HttpTransport>>,
}

impl HttpHandlerResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }
}

#[async_trait]
impl ResourceProvider for HttpHandlerResourceProvider {
    fn name(&self) -> &'static str {
        "http-handler"
    }

    fn capability(&self) -> Capability {
        Capability::of::<HttpHandlerResource>()
    }

    fn position(&self) -> ProviderPosition {
        if self.transport.is_some() {
            ProviderPosition::First
        } else {
            ProviderPosition::Normal
        }
    }

    async fn try_create(
        &self,
        source: &SourceRepository,
        _cancel: &CancellationToken,
    ) -> Result<Option<ResourceHandle>, ProviderError> {
        let transport: Arc<dyn HttpTransport> = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(ReqwestTransport::new(
                source.settings(),
                source.package_source().credentials.clone(),
            )?),
        };

        Ok(Some(handle(HttpHandlerResource::new(
            transport,
            source.settings().clone(),
        ))))
    }
}

/// A source's parsed service index.
#[derive(Debug)]
pub struct ServiceIndexResource {
    url: Url,
    index: ServiceIndex,
    fetched_at: DateTime<Utc>,
}

impl ServiceIndexResource {
    pub fn new(url: Url, index: ServiceIndex) -> Self {
        Self {
            url,
            index,
            fetched_at: Utc::now(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn index(&self) -> &ServiceIndex {
        &self.index
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

impl Deref for ServiceIndexResource {
    type Target = ServiceIndex;

    fn deref(&self) -> &ServiceIndex {
        &self.index
    }
}

impl Resource for ServiceIndexResource {}

/// Fetches and parses the source's service index.
///
/// Declines for sources whose URL does not name a JSON document and for
/// documents that are not a usable service index.
#[derive(Debug, Default)]
pub struct ServiceIndexResourceProvider;

impl ServiceIndexResourceProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResourceProvider for ServiceIndexResourceProvider {
    fn name(&self) -> &'static str {
        "service-index"
    }

    fn capability(&self) -> Capability {
        Capability::of::<ServiceIndexResource>()
    }

    async fn try_create(
        &self,
        source: &SourceRepository,
        cancel: &CancellationToken,
    ) -> Result<Option<ResourceHandle>, ProviderError> {
        let url = &source.package_source().url;
        if !url.path().ends_with(".json") {
            tracing::debug!("{} does not point at a service index", url);
            return Ok(None);
        }

        let handler = source
            .get_resource::<HttpHandlerResource>(cancel)
            .await?
            .ok_or(ProviderError::MissingDependency("HttpHandlerResource"))?;

        let document = match handler.client().fetch(url, cancel).await {
            Ok(document) => document,
            Err(FetchError::MalformedResponse { url, source }) => {
                tracing::warn!("Service index at {} is not JSON: {}", url, source);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match ServiceIndex::from_value(document.json()) {
            Ok(index) => Ok(Some(handle(ServiceIndexResource::new(url.clone(), index)))),
            Err(e) => {
                tracing::warn!("Ignoring service index at {}: {}", url, e);
                Ok(None)
            }
        }
    }
}
