//! History command implementation

use crate::cli::HistoryArgs;
use crate::commands::current_layout;
use crate::dry_run::{display_planned_actions, ActionType, PlannedAction};
use crate::errors::CliError;
use crate::output::OutputWriter;
use crate::output_types::{HistoryRow, TaskRow};
use crate::storage::Storage;
use anyhow::Result;

pub async fn execute(args: HistoryArgs, output: &OutputWriter, dry_run: bool) -> Result<()> {
    let layout = current_layout()?;

    if args.clear {
        if dry_run {
            let action = PlannedAction::new(ActionType::ClearHistory, "Forget every recorded import")
                .with_detail(format!("Path: {}", layout.history_path().display()));
            display_planned_actions(output, &[action]);
            return Ok(());
        }
        let storage = Storage::open(&layout, false).await?;
        storage.history.clear().await?;
        output.success("Import history cleared");
        return Ok(());
    }

    let storage = Storage::open(&layout, false).await?;

    if let Some(id) = args.id {
        let record = storage.history.get(id).await?.ok_or_else(|| {
            CliError::new(format!("No import with id {}", id)).with_help("Run: geocat history")
        })?;

        if output.is_json() {
            output.result(&record)?;
            return Ok(());
        }
        output.section(format!("Import #{} ({})", record.id, record.source));
        output.kv("State", record.state);
        if let Some(workspace) = &record.target_workspace {
            output.kv("Workspace", workspace);
        }
        if let Some(store) = &record.target_store {
            output.kv("Store", store);
        }
        output.table(record.tasks.iter().map(TaskRow::from_record).collect());
        return Ok(());
    }

    let records = storage.history.list().await?;
    if records.is_empty() && !output.is_json() {
        output.info("No imports recorded yet");
        return Ok(());
    }
    output.table(records.iter().map(HistoryRow::from).collect());
    Ok(())
}
