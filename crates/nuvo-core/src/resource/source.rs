//! Package sources and their per-source resource cache.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::HttpSettings;
use crate::error::Cancelled;

use super::{Capability, ProviderRegistry, Resource, ResourceHandle};

/// Basic credentials for a source.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A configured package feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSource {
    pub name: String,
    /// Service index URL
    pub url: Url,
    pub credentials: Option<Credentials>,
}

impl PackageSource {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Why a resolution produced nothing to cache.
enum Unresolved {
    NotFound,
    Cancelled,
}

/// A package source together with the resources resolved for it.
///
/// Each capability is resolved at most once at a time: concurrent callers
/// wait for the in-flight resolution and share its result. Successful results
/// stay cached until [`SourceRepository::invalidate`]; "not found" is never
/// cached.
#[derive(Debug)]
pub struct SourceRepository {
    source: PackageSource,
    settings: HttpSettings,
    providers: Arc<ProviderRegistry>,
    resources: DashMap<Capability, Arc<OnceCell<ResourceHandle>>>,
}

impl SourceRepository {
    /// Source backed by the process-wide provider registry.
    pub fn new(source: PackageSource, settings: HttpSettings) -> Self {
        Self::with_registry(source, settings, ProviderRegistry::global())
    }

    pub fn with_registry(
        source: PackageSource,
        settings: HttpSettings,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            source,
            settings,
            providers,
            resources: DashMap::new(),
        }
    }

    pub fn package_source(&self) -> &PackageSource {
        &self.source
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Resolve the resource of type `T`, or `None` when no provider can
    /// produce it for this source.
    pub async fn get_resource<T: Resource>(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<T>>, Cancelled> {
        let Some(handle) = self.resolve(Capability::of::<T>(), cancel).await? else {
            return Ok(None);
        };
        Ok(handle.downcast::<T>().ok())
    }

    /// Type-erased form of [`SourceRepository::get_resource`].
    pub async fn resolve(
        &self,
        capability: Capability,
        cancel: &CancellationToken,
    ) -> Result<Option<ResourceHandle>, Cancelled> {
        let cell = Arc::clone(self.resources.entry(capability).or_default().value());

        if let Some(handle) = cell.get() {
            return Ok(Some(Arc::clone(handle)));
        }

        match cell
            .get_or_try_init(|| self.run_providers(capability, cancel))
            .await
        {
            Ok(handle) => Ok(Some(Arc::clone(handle))),
            Err(Unresolved::NotFound) => Ok(None),
            Err(Unresolved::Cancelled) => Err(Cancelled),
        }
    }

    async fn run_providers(
        &self,
        capability: Capability,
        cancel: &CancellationToken,
    ) -> Result<ResourceHandle, Unresolved> {
        for provider in self.providers.candidates(capability) {
            if cancel.is_cancelled() {
                return Err(Unresolved::Cancelled);
            }

            match provider.try_create(self, cancel).await {
                Ok(Some(handle)) => {
                    let produced: &dyn Any = handle.as_ref();
                    if produced.type_id() != capability.id() {
                        tracing::warn!(
                            "Provider {} returned a resource that is not {}",
                            provider.name(),
                            capability
                        );
                        continue;
                    }
                    tracing::debug!(
                        "Resolved {} for {} via {}",
                        capability,
                        self.source.name,
                        provider.name()
                    );
                    return Ok(handle);
                }
                Ok(None) => {
                    tracing::debug!(
                        "Provider {} declined {} for {}",
                        provider.name(),
                        capability,
                        self.source.name
                    );
                }
                Err(e) if e.is_cancelled() => return Err(Unresolved::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        "Provider {} failed to create {} for {}: {}",
                        provider.name(),
                        capability,
                        self.source.name,
                        e
                    );
                }
            }
        }

        tracing::debug!("No provider produced {} for {}", capability, self.source.name);
        Err(Unresolved::NotFound)
    }

    /// Capabilities currently cached, sorted by name.
    pub fn cached_capabilities(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .resources
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().name())
            .collect();
        names.sort_unstable();
        names
    }

    /// Drop every cached resource. Resolutions still in flight complete but
    /// their results are not retained.
    pub fn invalidate(&self) {
        self.resources.clear();
    }
}
