use anyhow::{Context, Result};
use geocat_core::config::{CliConfigOverrides, FileConfig, LayeredConfig};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors;

/// Name of the per-project state directory
pub const STATE_DIR: &str = ".geocat";

/// Paths of the files inside a `.geocat` directory
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    pub root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir().join("config.toml")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.state_dir().join("catalog.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.state_dir().join("history.json")
    }

    pub fn databases_dir(&self) -> PathBuf {
        self.state_dir().join("databases")
    }

    /// Unpacked archives registered in place
    pub fn uploads_dir(&self) -> PathBuf {
        self.state_dir().join("uploads")
    }

    pub fn exists(&self) -> bool {
        self.state_dir().is_dir()
    }
}

/// Find workspace root directory
pub fn find_workspace_root() -> Result<PathBuf> {
    let mut current = std::env::current_dir()?;
    loop {
        if current.join(STATE_DIR).is_dir() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(errors::workspace_not_found().into());
        }
    }
}

/// Render the initial `config.toml`
pub fn default_config_toml(workspace: &str) -> Result<String> {
    let defaults = LayeredConfig::with_defaults();
    let file = FileConfig {
        workspace: Some(workspace.to_string()),
        archive: Some(defaults.archive.value),
        update_mode: Some(defaults.update_mode.value),
        compute_bounds: Some(defaults.compute_bounds.value),
        download_timeout_secs: Some(defaults.download_timeout_secs.value),
    };
    let body = toml::to_string_pretty(&file).context("Failed to serialize configuration")?;

    Ok(format!(
        "# GeoCat Workspace Configuration\n\
         #\n\
         # workspace: catalog workspace imports land in when none is given\n\
         # archive: delete sources after a fully successful import into a store\n\
         # update_mode: create, append or replace\n\
         # compute_bounds: scan features when a format reports no extent\n\
         # Each key can be overridden with a GEOCAT_* environment variable.\n\n{}",
        body
    ))
}

/// Load layered configuration for a workspace
pub fn load_workspace_config(layout: &WorkspaceLayout) -> Result<LayeredConfig> {
    let path = layout.config_path();
    let config = if path.exists() {
        LayeredConfig::with_defaults()
            .load_from_file(&path)
            .map_err(|e| errors::invalid_config("config.toml", &e.to_string()))?
    } else {
        LayeredConfig::with_defaults()
    };
    Ok(config.load_from_env())
}

/// Load layered configuration with CLI overrides
pub fn load_workspace_config_with_overrides(
    layout: &WorkspaceLayout,
    overrides: CliConfigOverrides,
) -> Result<LayeredConfig> {
    let mut config = load_workspace_config(layout)?;
    config.update_from_cli(overrides);
    Ok(config)
}

/// Write `content` to `path` unless it exists and `force` is off; true when written
pub fn write_new_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geocat_core::config::ConfigSource;
    use geocat_core::models::UpdateMode;

    #[test]
    fn test_default_config_round_trips_through_layered_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(temp_dir.path());
        fs::create_dir_all(layout.state_dir()).unwrap();
        fs::write(layout.config_path(), default_config_toml("topp").unwrap()).unwrap();

        let config = LayeredConfig::with_defaults().load_from_file(layout.config_path()).unwrap();
        assert_eq!(config.workspace.value, "topp");
        assert_eq!(config.workspace.source, ConfigSource::File);
        assert_eq!(config.update_mode.value, UpdateMode::Create);
        assert_eq!(config.download_timeout_secs.value, 120);
    }

    #[test]
    fn test_cli_overrides_win() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(temp_dir.path());

        let config = load_workspace_config_with_overrides(
            &layout,
            CliConfigOverrides { archive: Some(true), ..Default::default() },
        )
        .unwrap();
        assert!(config.archive.value);
        assert_eq!(config.archive.source, ConfigSource::Cli);
    }

    #[test]
    fn test_write_new_file_respects_force() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("catalog.json");
        assert!(write_new_file(&path, "{}", false).unwrap());
        assert!(!write_new_file(&path, "[]", false).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(write_new_file(&path, "[]", true).unwrap());
    }
}
