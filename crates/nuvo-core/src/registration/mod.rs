//! Package registrations: every published version of a package with its
//! catalog metadata.
//!
//! A registration is a root document split into pages. Small packages have
//! their pages inlined; large ones point at separately fetched page
//! documents. [`RegistrationResource::get_index`] fetches the root, loads any
//! remote pages concurrently and merges everything into one
//! [`RegistrationIndex`] ordered by version.

mod merge;
mod model;
mod provider;
mod resource;

#[cfg(test)]
mod tests;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Cancelled;
use crate::http::FetchError;
use crate::resource::SourceRepository;
use crate::version::NuGetVersion;

pub use merge::{PageGap, PageSummary, RegistrationIndex};
pub use model::{
    CatalogEntry, Dependency, DependencyGroup, RegistrationIndexDocument,
    RegistrationLeafDocument, RegistrationPageDocument,
};
pub use provider::RegistrationResourceProvider;
pub use resource::{
    RegistrationResource, RegistrationState, RegistrationTemplate, validate_package_id,
};

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid package id '{0}'")]
    InvalidPackageId(String),

    #[error("invalid registration template '{template}': {source}")]
    InvalidTemplate {
        template: String,
        #[source]
        source: url::ParseError,
    },

    #[error("registration of '{package_id}' is unavailable: {}", reasons.join("; "))]
    Unavailable {
        package_id: String,
        reasons: Vec<String>,
    },

    #[error("registration document {url} has an unexpected shape: {source}")]
    InvalidDocument {
        url: Url,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("source '{0}' does not provide package registrations")]
    NoRegistrationResource(String),

    #[error("registration lookup cancelled")]
    Cancelled,
}

impl RegistrationError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RegistrationError::Unavailable { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            RegistrationError::Cancelled => true,
            RegistrationError::Fetch(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

impl From<Cancelled> for RegistrationError {
    fn from(_: Cancelled) -> Self {
        RegistrationError::Cancelled
    }
}

async fn registration_resource(
    source: &SourceRepository,
    cancel: &CancellationToken,
) -> Result<std::sync::Arc<RegistrationResource>, RegistrationError> {
    source
        .get_resource::<RegistrationResource>(cancel)
        .await?
        .ok_or_else(|| RegistrationError::NoRegistrationResource(source.package_source().name.clone()))
}

/// Resolve the source's registration resource and load `package_id`.
pub async fn get_registration_index(
    source: &SourceRepository,
    package_id: &str,
    cancel: &CancellationToken,
) -> Result<Option<RegistrationIndex>, RegistrationError> {
    registration_resource(source, cancel)
        .await?
        .get_index(package_id, cancel)
        .await
}

/// Resolve the source's registration resource and look up one version.
pub async fn get_version(
    source: &SourceRepository,
    package_id: &str,
    version: &NuGetVersion,
    cancel: &CancellationToken,
) -> Result<Option<CatalogEntry>, RegistrationError> {
    registration_resource(source, cancel)
        .await?
        .get_version(package_id, version, cancel)
        .await
}
