use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf};

use crate::capability::CapabilityId;

/// Configuration for a single capability backend (e.g., access token).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub token: String,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Optional default capability id, e.g. "ipapi" or "ipinfo".
    pub default_capability: Option<String>,

    /// Example TOML:
    /// [capabilities.ipinfo]
    /// token = "..."
    pub capabilities: HashMap<String, CapabilityConfig>,
}

impl Config {
    /// Return the default capability as a strongly-typed CapabilityId.
    ///
    /// Falls back to the keyless `ipapi` backend when nothing is configured.
    pub fn default_capability_id(&self) -> Result<CapabilityId> {
        match self.default_capability.as_deref() {
            Some(s) => CapabilityId::try_from(s),
            None => Ok(CapabilityId::IpApi),
        }
    }

    pub fn capability_config(&self, id: CapabilityId) -> Option<&CapabilityConfig> {
        self.capabilities.get(id.as_str())
    }

    /// Store default capability as string.
    pub fn set_default_capability(&mut self, id: CapabilityId) {
        self.default_capability = Some(id.as_str().to_string());
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "geoloc", "geoloc-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Convenience helper: set/replace a capability token and optionally set
    /// it as the default capability.
    pub fn upsert_capability_token(&mut self, id: CapabilityId, token: String) {
        self.capabilities.insert(id.as_str().to_string(), CapabilityConfig { token });

        if self.default_capability.is_none() {
            self.default_capability = Some(id.to_string());
        }
    }

    /// Returns the access token for a capability, if present.
    pub fn capability_token(&self, id: CapabilityId) -> Option<&str> {
        self.capabilities.get(id.as_str()).map(|cfg| cfg.token.as_str())
    }

    pub fn is_capability_configured(&self, id: CapabilityId) -> bool {
        // Keyless backends are always usable.
        !id.requires_token() || self.capability_token(id).is_some()
    }
}
