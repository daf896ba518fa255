//! User settings (`<config-dir>/settings.yaml`)
//!
//! Precedence, highest first: command-line flags (applied by the caller),
//! `BERTH_CATALOG_SOURCE` / `BERTH_FETCH_TIMEOUT`, the settings file, then
//! built-in defaults. A missing settings file means defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::catalog::{
    CatalogSource, ResolverOptions, SourcePolicy, DEFAULT_CATALOG_SOURCE, DEFAULT_FETCH_TIMEOUT,
};
use crate::version::Version;

/// Overrides `default_source`
pub const SOURCE_ENV: &str = "BERTH_CATALOG_SOURCE";

/// Overrides `fetch_timeout_secs`
pub const TIMEOUT_ENV: &str = "BERTH_FETCH_TIMEOUT";

const SETTINGS_FILE: &str = "settings.yaml";
const TEMPLATE_FILE: &str = "template.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Catalog used when a command is given no `--source`
    pub default_source: String,
    pub fetch_timeout_secs: u64,
    /// Refuse to select a collection by name from the default catalog
    pub require_explicit_source: bool,
    /// Developer template location; `<config-dir>/template.yaml` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_source: DEFAULT_CATALOG_SOURCE.to_string(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            require_explicit_source: false,
            template_path: None,
        }
    }
}

/// Loads, overrides and persists [`Settings`]
pub struct SettingsManager {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Load settings from the default location
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join(SETTINGS_FILE);
        Self::load_from_path(path)
    }

    /// Load settings from a specific file
    pub fn load_from_path(settings_path: PathBuf) -> Result<Self> {
        let settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path).with_context(|| {
                format!("Failed to read settings: {}", settings_path.display())
            })?;
            serde_yaml_ng::from_str(&content).with_context(|| {
                format!("Failed to parse settings: {}", settings_path.display())
            })?
        } else {
            debug!("No settings at {}, using defaults", settings_path.display());
            Settings::default()
        };

        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn config_dir() -> Result<PathBuf> {
        directories::ProjectDirs::from("dev", "berth", "berth")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .or_else(|| dirs::config_dir().map(|d| d.join("berth")))
            .context("Could not determine config directory")
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Settings as stored in the file, without environment overrides
    pub fn stored(&self) -> &Settings {
        &self.settings
    }

    /// Settings with environment overrides applied
    pub fn effective(&self) -> Result<Settings> {
        let mut settings = self.settings.clone();

        if let Some(source) = env_value(SOURCE_ENV) {
            debug!("{} overrides default source", SOURCE_ENV);
            settings.default_source = source;
        }
        if let Some(raw) = env_value(TIMEOUT_ENV) {
            settings.fetch_timeout_secs = raw
                .parse()
                .with_context(|| format!("{TIMEOUT_ENV}='{raw}' is not a number of seconds"))?;
        }

        settings.template_path = Some(self.template_path_for(&settings));
        Ok(settings)
    }

    /// Template location, relative paths resolved against the settings file
    pub fn template_path(&self) -> PathBuf {
        self.template_path_for(&self.settings)
    }

    fn template_path_for(&self, settings: &Settings) -> PathBuf {
        let base = self
            .settings_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        match &settings.template_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => base.join(path),
            None => base.join(TEMPLATE_FILE),
        }
    }

    /// Resolver options for the effective settings
    pub fn resolver_options(&self, current_version: Version) -> Result<ResolverOptions> {
        let settings = self.effective()?;
        CatalogSource::parse(&settings.default_source)
            .with_context(|| format!("Invalid default catalog source in {}", self.settings_path.display()))?;

        Ok(ResolverOptions {
            default_source: settings.default_source,
            timeout: Duration::from_secs(settings.fetch_timeout_secs),
            source_policy: if settings.require_explicit_source {
                SourcePolicy::RequireExplicit
            } else {
                SourcePolicy::AllowDefault
            },
            current_version,
        })
    }

    /// Validate and store a new default catalog source
    pub fn set_default_source(&mut self, descriptor: &str) -> Result<()> {
        let source = CatalogSource::parse(descriptor)?;
        self.settings.default_source = source.descriptor();
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_yaml_ng::to_string(&self.settings)?;
        std::fs::write(&self.settings_path, content).with_context(|| {
            format!("Failed to write settings: {}", self.settings_path.display())
        })?;
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
