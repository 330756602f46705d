use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::http::HttpHandlerResource;
use crate::resource::{
    Capability, ProviderError, ProviderPosition, ResourceHandle, ResourceProvider,
    ServiceIndexResource, SourceRepository, handle,
};
use crate::service_index::service_types;

use super::RegistrationResource;

/// Builds a [`RegistrationResource`] from the source's service index.
///
/// Declines when the source has no service index or the index advertises no
/// registration endpoint.
#[derive(Debug, Default)]
pub struct RegistrationResourceProvider;

impl RegistrationResourceProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResourceProvider for RegistrationResourceProvider {
    fn name(&self) -> &'static str {
        "registration"
    }

    fn capability(&self) -> Capability {
        Capability::of::<RegistrationResource>()
    }

    fn position(&self) -> ProviderPosition {
        ProviderPosition::Last
    }

    async fn try_create(
        &self,
        source: &SourceRepository,
        cancel: &CancellationToken,
    ) -> Result<Option<ResourceHandle>, ProviderError> {
        let Some(index) = source.get_resource::<ServiceIndexResource>(cancel).await? else {
            return Ok(None);
        };

        let endpoints = index.lookup(service_types::REGISTRATIONS_BASE_URL);
        if endpoints.is_empty() {
            tracing::debug!(
                "{} advertises no {} endpoint",
                source.package_source().name,
                service_types::REGISTRATIONS_BASE_URL
            );
            return Ok(None);
        }

        let handler = source
            .get_resource::<HttpHandlerResource>(cancel)
            .await?
            .ok_or(ProviderError::MissingDependency("HttpHandlerResource"))?;

        Ok(Some(handle(RegistrationResource::new(
            Arc::clone(handler.client()),
            endpoints,
        ))))
    }
}
