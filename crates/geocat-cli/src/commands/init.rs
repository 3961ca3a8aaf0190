//! Init command implementation

use crate::cli::InitArgs;
use crate::config::{default_config_toml, write_new_file, WorkspaceLayout};
use crate::dry_run::{display_planned_actions, ActionType, PlannedAction};
use crate::errors;
use crate::output::OutputWriter;
use crate::output_types::InitOutput;
use anyhow::{Context, Result};
use geocat_core::config::LayeredConfig;
use std::fs;

pub async fn execute(args: InitArgs, output: &OutputWriter, dry_run: bool) -> Result<()> {
    let layout = WorkspaceLayout::new(&args.path);
    if layout.exists() && !args.force {
        return Err(errors::workspace_exists(&args.path.display().to_string()).into());
    }

    let default_workspace = args
        .workspace
        .clone()
        .unwrap_or_else(|| LayeredConfig::with_defaults().workspace.value);
    let config_toml = default_config_toml(&default_workspace)?;

    if dry_run {
        let actions = vec![
            PlannedAction::new(
                ActionType::CreateDirectory,
                format!("Create .geocat directory at {}", args.path.display()),
            ),
            PlannedAction::new(ActionType::CreateFile, "Create config.toml")
                .with_detail(format!("Default workspace: {}", default_workspace)),
            PlannedAction::new(ActionType::CreateFile, "Create catalog.json (empty)"),
            PlannedAction::new(ActionType::CreateFile, "Create history.json (empty)"),
            PlannedAction::new(ActionType::CreateDirectory, "Create databases directory"),
        ];
        display_planned_actions(output, &actions);
        return Ok(());
    }

    fs::create_dir_all(layout.databases_dir()).context("Failed to create .geocat directory")?;

    let config_written = write_new_file(&layout.config_path(), &config_toml, args.force)?;
    write_new_file(&layout.catalog_path(), "{}", false)?;
    write_new_file(&layout.history_path(), "{}", false)?;

    if output.is_json() {
        output.result(InitOutput {
            workspace_path: args.path.display().to_string(),
            default_workspace,
            config_written,
        })?;
    } else {
        output.success(format!("Initialized GeoCat workspace at {}", args.path.display()));
        output.section("Configuration");
        output.kv("Default workspace", &default_workspace);
        output.kv("Databases", layout.databases_dir().display());
    }

    Ok(())
}
