//! Configuration schema for nuvo.toml
//!
//! ```toml
//! [http]
//! timeout_secs = 100
//! max_retries = 3
//!
//! [sources.nuget-org]
//! url = "https://api.nuget.org/v3/index.json"
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::resource::{Credentials, PackageSource};

/// Name of the source used when no configuration file exists.
pub const DEFAULT_SOURCE_NAME: &str = "nuget.org";

/// Service index of the public feed.
pub const DEFAULT_SOURCE_URL: &str = "https://api.nuget.org/v3/index.json";

/// Root configuration structure for nuvo.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NuvoConfig {
    /// HTTP behaviour shared by every source
    #[serde(default)]
    pub http: HttpSettings,

    /// Package sources keyed by name
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfigEntry>,
}

/// HTTP fetch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Overall budget for one fetch, retries included
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry; doubles on each further retry
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Upper bound for the backoff delay
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Remote registration pages fetched at the same time
    #[serde(default = "default_max_concurrent_pages")]
    pub max_concurrent_pages: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Proxy for every request
    #[serde(default)]
    pub proxy: Option<Url>,
}

fn default_timeout_secs() -> u64 {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    200
}

fn default_retry_max_delay_ms() -> u64 {
    5_000
}

fn default_max_concurrent_pages() -> usize {
    8
}

fn default_user_agent() -> String {
    concat!("nuvo/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            max_concurrent_pages: default_max_concurrent_pages(),
            user_agent: default_user_agent(),
            proxy: None,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff before retry number `retry` (zero based).
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.min(32)).unwrap_or(u64::MAX);
        let delay = self.retry_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.retry_max_delay_ms))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_secs == 0 {
            anyhow::bail!("http.timeout_secs must be at least 1");
        }
        if self.max_concurrent_pages == 0 {
            anyhow::bail!("http.max_concurrent_pages must be at least 1");
        }
        if self.retry_max_delay_ms < self.retry_delay_ms {
            anyhow::bail!("http.retry_max_delay_ms must not be smaller than http.retry_delay_ms");
        }
        if let Some(proxy) = &self.proxy
            && !matches!(proxy.scheme(), "http" | "https" | "socks5")
        {
            anyhow::bail!("Unsupported proxy scheme: {}", proxy.scheme());
        }
        Ok(())
    }
}

/// A configured package source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfigEntry {
    /// Service index URL
    pub url: Url,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Basic credentials
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl SourceConfigEntry {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            enabled: true,
            username: None,
            password: None,
        }
    }

    pub fn validate(&self, name: &str) -> anyhow::Result<()> {
        if !matches!(self.url.scheme(), "http" | "https") {
            anyhow::bail!(
                "Source '{}' must use an http(s) URL, got '{}'",
                name,
                self.url
            );
        }
        if self.password.is_some() && self.username.is_none() {
            anyhow::bail!("Source '{}' has a password but no username", name);
        }
        Ok(())
    }

    pub fn to_package_source(&self, name: &str) -> PackageSource {
        let credentials = self.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.password.clone(),
        });
        PackageSource {
            name: name.to_string(),
            url: self.url.clone(),
            credentials,
        }
    }
}

impl NuvoConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration used when no nuvo.toml exists
    pub fn with_default_sources() -> Self {
        let mut config = Self::new();
        if let Ok(url) = Url::parse(DEFAULT_SOURCE_URL) {
            config
                .sources
                .insert(DEFAULT_SOURCE_NAME.to_string(), SourceConfigEntry::new(url));
        }
        config
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.http.validate()?;
        for (name, source) in &self.sources {
            source.validate(name)?;
        }
        Ok(())
    }

    /// Enabled sources, ordered by name
    pub fn enabled_sources(&self) -> Vec<PackageSource> {
        self.sources
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(name, entry)| entry.to_package_source(name))
            .collect()
    }

    /// Look a source up by configured name, falling back to a literal URL.
    pub fn find_source(&self, name_or_url: &str) -> Option<PackageSource> {
        if let Some(entry) = self.sources.get(name_or_url) {
            return Some(entry.to_package_source(name_or_url));
        }
        let url = Url::parse(name_or_url).ok()?;
        if let Some((name, entry)) = self.sources.iter().find(|(_, e)| e.url == url) {
            return Some(entry.to_package_source(name));
        }
        Some(PackageSource::new(url.to_string(), url))
    }
}
