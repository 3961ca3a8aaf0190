//! Config command implementation

use crate::config::{find_workspace_root, load_workspace_config, WorkspaceLayout};
use crate::output::OutputWriter;
use crate::output_types::ConfigRow;
use anyhow::Result;
use geocat_core::config::LayeredConfig;

/// Show the effective configuration and where each value comes from
pub fn execute(output: &OutputWriter) -> Result<()> {
    let config = match find_workspace_root() {
        Ok(root) => {
            let layout = WorkspaceLayout::new(root);
            let config = load_workspace_config(&layout)?;
            if !output.is_json() {
                output.kv("Config file", layout.config_path().display());
            }
            config
        }
        Err(_) => LayeredConfig::with_defaults().load_from_env(),
    };

    output.table(ConfigRow::rows(&config));
    Ok(())
}
