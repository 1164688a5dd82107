// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of PowerMan.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result, bail};
use powerman_types::{EntryConfig, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Options file written by the Home Assistant supervisor for add-ons
pub const ADDON_OPTIONS_PATH: &str = "/data/options.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub home_assistant: HomeAssistantSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub entries: Vec<EntryConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomeAssistantSettings {
    /// Falls back to `HA_BASE_URL`, then `http://localhost:8123`
    #[serde(default)]
    pub base_url: Option<String>,
    /// Falls back to `HA_TOKEN`
    #[serde(default)]
    pub token: Option<String>,
    /// Used when Home Assistant does not report its own timezone
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8098
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from the add-on options when `path` does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::from_file(path);
        }

        if let Ok(options) = std::fs::read_to_string(ADDON_OPTIONS_PATH) {
            let config: Self =
                serde_json::from_str(&options).context("Failed to parse HA addon options")?;
            info!("✅ Loaded configuration from HA addon options");
            config.validate()?;
            return Ok(config);
        }

        bail!(
            "Config file {} not found and no HA addon options at {}",
            path.display(),
            ADDON_OPTIONS_PATH
        )
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("Failed to parse config TOML")?;
        info!("✅ Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration with detailed error reporting
    pub fn validate_detailed(&self) -> ValidationResult {
        let mut result = ValidationResult::success();

        if self.entries.is_empty() {
            result.add_error("entries", "Configuration must include at least one entry");
            return result;
        }

        if self.server.port == 0 {
            result.add_error("server.port", "Port must not be 0");
        }

        let mut seen = HashSet::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            let prefix = format!("entries[{idx}]");

            if entry.id.trim().is_empty() {
                result.add_error(format!("{prefix}.id"), "Entry ID cannot be empty");
            } else if !seen.insert(entry.id.as_str()) {
                result.add_error(
                    format!("{prefix}.id"),
                    format!("Duplicate entry ID '{}'", entry.id),
                );
            }

            if entry.entities.is_empty() {
                result.add_warning(
                    format!("{prefix}.entities"),
                    "No entities mapped, this entry will never produce advice",
                );
            }

            result.merge(entry.options.validate(&format!("{prefix}.options.")));
        }

        result
    }

    /// Fail on errors, log warnings
    pub fn validate(&self) -> Result<()> {
        let result = self.validate_detailed();
        for warning in &result.warnings {
            warn!("⚠️ {}: {}", warning.field, warning.message);
        }
        if result.has_errors() {
            bail!("Invalid configuration: {}", result.error_summary());
        }
        Ok(())
    }

    /// Longest external advisor timeout across entries
    pub fn max_external_call_timeout_secs(&self) -> u64 {
        self.entries
            .iter()
            .filter(|entry| entry.options.external_agent().is_some())
            .map(|entry| entry.options.external_call_timeout_secs)
            .max()
            .unwrap_or(0)
    }
}
