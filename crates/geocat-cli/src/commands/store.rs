//! Store command implementation

use crate::cli::{StoreAddArgs, StoreArgs, StoreCommand, StoreListArgs};
use crate::commands::current_layout;
use crate::config::load_workspace_config;
use crate::dry_run::{display_planned_actions, ActionType, PlannedAction};
use crate::errors::{self, CliError};
use crate::output::OutputWriter;
use crate::output_types::StoreRow;
use crate::storage::{database_params, is_workspace_database, Storage};
use anyhow::Result;
use geocat_core::models::{StoreInfo, WorkspaceInfo};
use geocat_core::ports::CatalogChange;

pub async fn execute(args: StoreArgs, output: &OutputWriter, dry_run: bool) -> Result<()> {
    match args.command {
        StoreCommand::Add(args) => add(args, output, dry_run).await,
        StoreCommand::List(args) => list(args, output).await,
    }
}

async fn add(args: StoreAddArgs, output: &OutputWriter, dry_run: bool) -> Result<()> {
    let layout = current_layout()?;
    let config = load_workspace_config(&layout)?;
    let storage = Storage::open(&layout, dry_run).await?;

    let workspace = args.workspace.clone().unwrap_or(config.workspace.value);
    let params = database_params(&args.database);
    if !is_workspace_database(&params) {
        return Err(CliError::new(format!("Unsupported database URL: {}", params))
            .with_suggestion("Pass a database name or a json:// URL")
            .into());
    }

    if storage.catalog.store(&workspace, &args.name).await?.is_some() {
        return Err(CliError::new(format!("Store '{}' already exists in workspace '{}'", args.name, workspace))
            .with_help("Run: geocat store list")
            .into());
    }
    let missing_workspace = storage.catalog.workspace(&workspace).await?.is_none();

    if dry_run {
        let mut actions = Vec::new();
        if missing_workspace {
            actions.push(PlannedAction::new(
                ActionType::RegisterWorkspace,
                format!("Register workspace {}", workspace),
            ));
        }
        actions.push(PlannedAction::new(ActionType::CreateDatabase, format!("Create database {} if missing", params)));
        actions.push(
            PlannedAction::new(ActionType::RegisterStore, format!("Register store {}:{}", workspace, args.name))
                .with_detail(format!("Connection: {}", params)),
        );
        display_planned_actions(output, &actions);
        return Ok(());
    }

    storage.connector.create_database(&params).await.map_err(errors::from_import)?;
    let outcome = storage
        .catalog
        .commit(CatalogChange {
            workspace: missing_workspace.then(|| WorkspaceInfo::new(workspace.clone())),
            store: Some(StoreInfo::tabular(workspace.clone(), args.name.clone(), params)),
            layer: None,
        })
        .await
        .map_err(errors::from_import)?;

    tracing::info!(workspace = %workspace, store = %args.name, "Registered tabular store");
    let Some(store) = outcome.store else {
        return Err(CliError::new("Catalog did not register the store").into());
    };
    if output.is_json() {
        output.result(StoreRow::from(&store))?;
    } else {
        output.success(format!("Registered store {}:{}", store.workspace, store.name));
        output.kv("Connection", StoreRow::from(&store).connection);
    }
    Ok(())
}

async fn list(args: StoreListArgs, output: &OutputWriter) -> Result<()> {
    let layout = current_layout()?;
    let storage = Storage::open(&layout, true).await?;

    let workspaces = match args.workspace {
        Some(name) => {
            if storage.catalog.workspace(&name).await?.is_none() {
                return Err(errors::catalog_workspace_not_found(&name).into());
            }
            vec![name]
        }
        None => storage.catalog.workspaces().await?.into_iter().map(|w| w.name).collect(),
    };

    let mut rows = Vec::new();
    for workspace in &workspaces {
        rows.extend(storage.catalog.stores(workspace).await?.iter().map(StoreRow::from));
    }

    if rows.is_empty() && !output.is_json() {
        output.info("No stores registered. Add one with: geocat store add <name> --database <db>");
        return Ok(());
    }
    output.table(rows);
    Ok(())
}
