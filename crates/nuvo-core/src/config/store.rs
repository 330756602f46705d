//! Config store for loading and saving nuvo.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{NuvoConfig, parser};

const CONFIG_FILE_NAME: &str = "nuvo.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Store rooted at the user's configuration directory.
    pub fn from_default_location() -> anyhow::Result<Self> {
        let global_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("nuvo");

        Ok(Self::from_path(global_dir.join(CONFIG_FILE_NAME)))
    }

    pub fn from_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration, falling back to the public feed when the file
    /// does not exist.
    pub fn load(&self) -> anyhow::Result<NuvoConfig> {
        if !self.config_path.exists() {
            return Ok(NuvoConfig::with_default_sources());
        }
        parser::parse_nuvo_toml(&self.config_path)
    }

    pub fn save(&self, config: &NuvoConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config).context("Failed to serialize config to TOML")?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }
}
