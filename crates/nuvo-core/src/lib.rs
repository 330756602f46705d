//! Nuvo Core Library
//!
//! Resolves the resources a package source offers (HTTP handler, service
//! index, package registrations) through a chain of providers, and loads
//! package registrations with conditional, cached HTTP fetches.

pub mod config;
pub mod error;
pub mod http;
pub mod registration;
pub mod resource;
pub mod service_index;
pub mod version;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, HttpSettings, NuvoConfig, SourceConfigEntry};

    // Resources
    pub use crate::resource::{
        Capability, Credentials, PackageSource, ProviderPosition, ProviderRegistry, Resource,
        ResourceProvider, ServiceIndexResource, SourceRepository,
    };

    // HTTP
    pub use crate::http::{DataClient, HttpHandlerResource, HttpTransport, ReqwestTransport};

    // Service index
    pub use crate::service_index::{ServiceIndex, service_types};

    // Registrations
    pub use crate::registration::{
        CatalogEntry, RegistrationError, RegistrationIndex, RegistrationResource,
        get_registration_index, get_version,
    };

    // Version
    pub use crate::version::NuGetVersion;
}
