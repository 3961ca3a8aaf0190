//! Workspace command implementation

use crate::cli::{WorkspaceArgs, WorkspaceCommand};
use crate::commands::current_layout;
use crate::dry_run::{display_planned_actions, ActionType, PlannedAction};
use crate::errors;
use crate::output::OutputWriter;
use crate::output_types::WorkspaceRow;
use crate::storage::Storage;
use anyhow::Result;
use geocat_core::models::WorkspaceInfo;

pub async fn execute(args: WorkspaceArgs, output: &OutputWriter, dry_run: bool) -> Result<()> {
    let layout = current_layout()?;
    let storage = Storage::open(&layout, dry_run).await?;

    match args.command {
        WorkspaceCommand::Add(args) => {
            if dry_run {
                let action = PlannedAction::new(ActionType::RegisterWorkspace, format!("Register workspace {}", args.name));
                display_planned_actions(output, &[action]);
                return Ok(());
            }

            storage
                .catalog
                .add_workspace(WorkspaceInfo::new(args.name.clone()))
                .await
                .map_err(errors::from_import)?;
            if output.is_json() {
                output.result(WorkspaceRow { name: args.name, stores: 0, layers: 0 })?;
            } else {
                output.success(format!("Created workspace {}", args.name));
            }
        }
        WorkspaceCommand::List => {
            let default = storage.catalog.default_workspace().await?.map(|w| w.name);
            let mut rows = Vec::new();
            for workspace in storage.catalog.workspaces().await? {
                let stores = storage.catalog.stores(&workspace.name).await?.len();
                let layers = storage.catalog.layers(Some(&workspace.name)).await?.len();
                rows.push(WorkspaceRow { name: workspace.name, stores, layers });
            }

            if rows.is_empty() && !output.is_json() {
                output.info("No workspaces yet. The first import creates the configured one.");
                return Ok(());
            }
            output.table(rows);
            if let Some(default) = default {
                output.kv("Default", default);
            }
        }
    }
    Ok(())
}
