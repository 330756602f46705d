//! Capability-typed resources and the providers that create them
//!
//! A [`SourceRepository`] exposes typed resources (service index, HTTP
//! handler, registration lookup, ...). Each resource type is a capability;
//! [`ResourceProvider`]s registered in a [`ProviderRegistry`] compete to
//! produce it. Candidates run in [`ProviderPosition`] order and the first one
//! that returns a resource wins. The winner is cached on the source.

mod providers;
mod registry;
mod source;


use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::Cancelled;
use crate::http::FetchError;

pub use providers::{HttpHandlerResourceProvider, ServiceIndexResource, ServiceIndexResourceProvider};
pub use registry::ProviderRegistry;
pub use source::{Credentials, PackageSource, SourceRepository};

/// Marker for types that can be resolved from a source.
pub trait Resource: Any + Send + Sync + fmt::Debug {}

/// Type-erased resource as produced by a provider.
pub type ResourceHandle = Arc<dyn Any + Send + Sync>;

/// Wrap a concrete resource for return from [`ResourceProvider::try_create`].
pub fn handle<T: Resource>(resource: T) -> ResourceHandle {
    Arc::new(resource)
}

/// Identifies a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability {
    id: TypeId,
    name: &'static str,
}

impl Capability {
    pub fn of<T: Resource>() -> Self {
        let full = std::any::type_name::<T>();
        Self {
            id: TypeId::of::<T>(),
            name: full.rsplit("::").next().unwrap_or(full),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Relative order among providers of the same capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ProviderPosition {
    First,
    #[default]
    Normal,
    Last,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("resolution cancelled")]
    Cancelled,
    #[error("required resource {0} is unavailable")]
    MissingDependency(&'static str),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProviderError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            ProviderError::Cancelled => true,
            ProviderError::Fetch(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

impl From<Cancelled> for ProviderError {
    fn from(_: Cancelled) -> Self {
        ProviderError::Cancelled
    }
}

/// Creates one kind of resource for a source.
///
/// `Ok(None)` declines (the source lacks what this provider needs); the
/// pipeline moves on to the next candidate. An error aborts only this
/// candidate. Providers may resolve other capabilities of the same source but
/// never their own.
#[async_trait]
pub trait ResourceProvider: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn capability(&self) -> Capability;

    fn position(&self) -> ProviderPosition {
        ProviderPosition::Normal
    }

    async fn try_create(
        &self,
        source: &SourceRepository,
        cancel: &CancellationToken,
    ) -> Result<Option<ResourceHandle>, ProviderError>;
}
