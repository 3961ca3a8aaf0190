//! Layered importer configuration
//!
//! Values are resolved from defaults, a TOML file, `GEOCAT_*` environment
//! variables and CLI flags, each layer overriding the previous one.

use crate::error::{ImportError, Result};
use crate::models::UpdateMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Provided via CLI argument
    Cli,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Cli => 3,
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => f.write_str("default"),
            ConfigSource::File => f.write_str("file"),
            ConfigSource::Environment => f.write_str("env"),
            ConfigSource::Cli => f.write_str("cli"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value unless the current source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() >= self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Layered configuration for the importer
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// Workspace imports land in when none is named
    pub workspace: ConfigValue<String>,
    /// Delete sources after a fully successful indirect import
    pub archive: ConfigValue<bool>,
    pub update_mode: ConfigValue<UpdateMode>,
    /// Scan features for an extent when the reader cannot report one
    pub compute_bounds: ConfigValue<bool>,
    pub download_timeout_secs: ConfigValue<u64>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        Self {
            workspace: ConfigValue::new("default".to_string(), ConfigSource::Default),
            archive: ConfigValue::new(false, ConfigSource::Default),
            update_mode: ConfigValue::new(UpdateMode::Create, ConfigSource::Default),
            compute_bounds: ConfigValue::new(true, ConfigSource::Default),
            download_timeout_secs: ConfigValue::new(120, ConfigSource::Default),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ImportError::ConfigInvalid {
            key: "file".to_string(),
            reason: format!("Failed to read config file: {}", e),
        })?;

        let file_config: FileConfig = toml::from_str(&content).map_err(|e| ImportError::ConfigInvalid {
            key: "file".to_string(),
            reason: format!("Failed to parse TOML: {}", e),
        })?;

        if let Some(workspace) = file_config.workspace {
            self.workspace.update(workspace, ConfigSource::File);
        }
        if let Some(archive) = file_config.archive {
            self.archive.update(archive, ConfigSource::File);
        }
        if let Some(update_mode) = file_config.update_mode {
            self.update_mode.update(update_mode, ConfigSource::File);
        }
        if let Some(compute_bounds) = file_config.compute_bounds {
            self.compute_bounds.update(compute_bounds, ConfigSource::File);
        }
        if let Some(timeout) = file_config.download_timeout_secs {
            self.download_timeout_secs.update(timeout, ConfigSource::File);
        }

        Ok(self)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        if let Ok(workspace) = env::var("GEOCAT_WORKSPACE") {
            if workspace.trim().is_empty() {
                tracing::warn!("Ignoring empty GEOCAT_WORKSPACE");
            } else {
                self.workspace.update(workspace, ConfigSource::Environment);
            }
        }

        if let Ok(archive) = env::var("GEOCAT_ARCHIVE") {
            match parse_bool(&archive) {
                Some(value) => self.archive.update(value, ConfigSource::Environment),
                None => tracing::warn!("Invalid GEOCAT_ARCHIVE value '{}': expected true or false", archive),
            }
        }

        if let Ok(mode) = env::var("GEOCAT_UPDATE_MODE") {
            match mode.parse::<UpdateMode>() {
                Ok(value) => self.update_mode.update(value, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid GEOCAT_UPDATE_MODE value '{}': expected create, append or replace",
                    mode
                ),
            }
        }

        if let Ok(compute) = env::var("GEOCAT_COMPUTE_BOUNDS") {
            match parse_bool(&compute) {
                Some(value) => self.compute_bounds.update(value, ConfigSource::Environment),
                None => tracing::warn!(
                    "Invalid GEOCAT_COMPUTE_BOUNDS value '{}': expected true or false",
                    compute
                ),
            }
        }

        if let Ok(timeout) = env::var("GEOCAT_DOWNLOAD_TIMEOUT") {
            match timeout.trim().parse::<u64>() {
                Ok(value) if value > 0 => {
                    self.download_timeout_secs.update(value, ConfigSource::Environment)
                }
                _ => tracing::warn!(
                    "Invalid GEOCAT_DOWNLOAD_TIMEOUT value '{}': expected a positive number of seconds",
                    timeout
                ),
            }
        }

        self
    }

    /// Update configuration from CLI arguments
    pub fn update_from_cli(&mut self, overrides: CliConfigOverrides) {
        if let Some(workspace) = overrides.workspace {
            self.workspace.update(workspace, ConfigSource::Cli);
        }
        if let Some(archive) = overrides.archive {
            self.archive.update(archive, ConfigSource::Cli);
        }
        if let Some(update_mode) = overrides.update_mode {
            self.update_mode.update(update_mode, ConfigSource::Cli);
        }
        if let Some(compute_bounds) = overrides.compute_bounds {
            self.compute_bounds.update(compute_bounds, ConfigSource::Cli);
        }
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> BTreeMap<String, (String, ConfigSource)> {
        let mut map = BTreeMap::new();
        map.insert("workspace".to_string(), (self.workspace.value.clone(), self.workspace.source));
        map.insert("archive".to_string(), (self.archive.value.to_string(), self.archive.source));
        map.insert(
            "update_mode".to_string(),
            (self.update_mode.value.to_string(), self.update_mode.source),
        );
        map.insert(
            "compute_bounds".to_string(),
            (self.compute_bounds.value.to_string(), self.compute_bounds.source),
        );
        map.insert(
            "download_timeout_secs".to_string(),
            (self.download_timeout_secs.value.to_string(), self.download_timeout_secs.source),
        );
        map
    }
}

impl Default for LayeredConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_mode: Option<UpdateMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_bounds: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_timeout_secs: Option<u64>,
}

/// CLI configuration overrides
#[derive(Debug, Default)]
pub struct CliConfigOverrides {
    pub workspace: Option<String>,
    pub archive: Option<bool>,
    pub update_mode: Option<UpdateMode>,
    pub compute_bounds: Option<bool>,
}

/// Parse a boolean flag value (`true/false`, `1/0`, `yes/no`, `on/off`)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = LayeredConfig::with_defaults();
        assert_eq!(config.workspace.value, "default");
        assert!(!config.archive.value);
        assert_eq!(config.update_mode.value, UpdateMode::Create);
        assert!(config.compute_bounds.value);
        assert_eq!(config.download_timeout_secs.value, 120);
        assert_eq!(config.workspace.source, ConfigSource::Default);
    }

    #[test]
    fn test_config_precedence() {
        let mut value = ConfigValue::new(100, ConfigSource::Default);

        value.update(200, ConfigSource::File);
        assert_eq!(value.value, 200);

        value.update(300, ConfigSource::Cli);
        assert_eq!(value.value, 300);

        // Lower precedence should not override
        value.update(400, ConfigSource::Environment);
        assert_eq!(value.value, 300);
        assert_eq!(value.source, ConfigSource::Cli);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
workspace = "topp"
archive = true
update_mode = "append"
"#
        )
        .unwrap();

        let config = LayeredConfig::with_defaults().load_from_file(file.path()).unwrap();

        assert_eq!(config.workspace.value, "topp");
        assert_eq!(config.workspace.source, ConfigSource::File);
        assert!(config.archive.value);
        assert_eq!(config.update_mode.value, UpdateMode::Append);
        assert_eq!(config.compute_bounds.source, ConfigSource::Default);
    }

    #[test]
    fn test_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "update_mode = \"merge\"").unwrap();
        assert!(LayeredConfig::with_defaults().load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = LayeredConfig::with_defaults();
        config.update_from_cli(CliConfigOverrides {
            update_mode: Some(UpdateMode::Replace),
            ..Default::default()
        });

        assert_eq!(config.update_mode.value, UpdateMode::Replace);
        assert_eq!(config.update_mode.source, ConfigSource::Cli);
        assert_eq!(config.archive.source, ConfigSource::Default);
    }

    #[test]
    fn test_inspection_map() {
        let map = LayeredConfig::with_defaults().to_inspection_map();
        assert_eq!(map.len(), 5);
        let (mode, source) = &map["update_mode"];
        assert_eq!(mode, "create");
        assert_eq!(*source, ConfigSource::Default);
    }
}
