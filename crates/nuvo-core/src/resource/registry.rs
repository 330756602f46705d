//! Provider registry for resolving resources.
//!
//! The registry holds every known provider in resolution order: grouped by
//! [`ProviderPosition`](super::ProviderPosition), registration order within a group.

use std::sync::{Arc, OnceLock};

use crate::http::HttpTransport;
use crate::registration::RegistrationResourceProvider;

use super::{
    Capability, HttpHandlerResourceProvider, ResourceProvider, ServiceIndexResourceProvider,
};

/// Registry of available resource providers.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn ResourceProvider>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_default_providers()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Create a registry with the built-in providers.
    pub fn with_default_providers() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(HttpHandlerResourceProvider::new()));
        registry.register(Box::new(ServiceIndexResourceProvider::new()));
        registry.register(Box::new(RegistrationResourceProvider::new()));
        registry
    }

    /// Built-in providers with requests sent through `transport`.
    pub fn with_transport(transport: Arc<dyn HttpTransport>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(HttpHandlerResourceProvider::with_transport(
            transport,
        )));
        registry.register(Box::new(ServiceIndexResourceProvider::new()));
        registry.register(Box::new(RegistrationResourceProvider::new()));
        registry
    }

    /// Process-wide registry of built-in providers, created on first use.
    pub fn global() -> Arc<ProviderRegistry> {
        static GLOBAL: OnceLock<Arc<ProviderRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::with_default_providers())))
    }

    /// Register a provider behind every provider of an equal or earlier
    /// position.
    pub fn register(&mut self, provider: Box<dyn ResourceProvider>) {
        let position = provider.position();
        let index = self
            .providers
            .iter()
            .position(|p| p.position() > position)
            .unwrap_or(self.providers.len());
        self.providers.insert(index, provider);
    }

    /// Get all registered providers in resolution order.
    pub fn all(&self) -> &[Box<dyn ResourceProvider>] {
        &self.providers
    }

    /// Get a provider by name.
    pub fn get(&self, name: &str) -> Option<&dyn ResourceProvider> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    /// Providers able to produce `capability`, in the order they are tried.
    pub fn candidates(&self, capability: Capability) -> Vec<&dyn ResourceProvider> {
        self.providers
            .iter()
            .filter(|p| p.capability() == capability)
            .map(|p| p.as_ref())
            .collect()
    }

    /// List all provider names.
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
