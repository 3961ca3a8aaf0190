//! Import command implementation

use crate::cli::ImportArgs;
use crate::commands::current_layout;
use crate::config::load_workspace_config_with_overrides;
use crate::dry_run::{display_planned_actions, ActionType, PlannedAction};
use crate::errors;
use crate::output::OutputWriter;
use crate::output_types::{ImportOutput, TaskRow};
use crate::progress::{create_spinner, ImportProgressBar};
use crate::storage::{database_params, Storage};
use anyhow::Result;
use geocat_core::config::CliConfigOverrides;
use geocat_core::models::{ContextState, Crs, DataSource, TaskState};
use geocat_import::{ImportContext, Importer};
use std::path::Path;

pub async fn execute(args: ImportArgs, output: &OutputWriter, dry_run: bool) -> Result<()> {
    let layout = current_layout()?;
    let config = load_workspace_config_with_overrides(
        &layout,
        CliConfigOverrides {
            workspace: None,
            archive: args.archive.then_some(true),
            update_mode: args.update_mode,
            compute_bounds: args.no_compute_bounds.then_some(false),
        },
    )?;

    let srs = match &args.srs {
        Some(code) => Some(Crs::parse(code).map_err(|e| errors::invalid_srs(code, &e.to_string()))?),
        None => None,
    };
    let source = infer_source(&args);

    let storage = Storage::open(&layout, dry_run).await?;
    let importer = storage.importer(&config);

    let spinner = (!output.is_json()).then(|| create_spinner(&format!("Reading {}", source)));
    let created = importer
        .create_context(source, args.workspace.as_deref(), args.store.as_deref())
        .await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let mut ctx = created.map_err(errors::from_import)?;

    repair(&importer, &mut ctx, &args, srs.as_ref()).await?;
    tracing::debug!(
        context_id = ctx.id(),
        tasks = ctx.tasks().len(),
        state = %ctx.state(),
        dry_run,
        "Import context prepared"
    );

    if dry_run {
        display_planned_actions(output, &plan(&ctx));
        return Ok(());
    }

    let mut bar = ImportProgressBar::new(ctx.tasks().len(), output.is_json());
    let state = importer.run_with_progress(&mut ctx, |progress| bar.update(&progress)).await?;
    let completed = ctx.tasks().iter().filter(|t| t.state() == TaskState::Complete).count();
    bar.finish(&format!("{} of {} task(s) imported", completed, ctx.tasks().len()));

    if output.is_json() {
        output.result(ImportOutput::from_context(&ctx))?;
        return Ok(());
    }

    output.section(format!("Import #{}", ctx.id()));
    output.table(ctx.tasks().iter().map(TaskRow::from_task).collect());
    output.kv("State", state);
    print_hints(output, &importer, &ctx);
    Ok(())
}

/// Source kind implied by the argument and flags
fn infer_source(args: &ImportArgs) -> DataSource {
    if args.database {
        return DataSource::database(database_params(&args.source));
    }

    let lower = args.source.to_ascii_lowercase();
    let remote = ["http://", "https://", "file:"].iter().any(|p| lower.starts_with(p));
    if remote || lower.ends_with(".zip") {
        return DataSource::archive(args.source.clone());
    }

    let path = Path::new(&args.source);
    if path.is_dir() {
        return DataSource::directory(path);
    }
    match &args.format {
        Some(hint) => DataSource::file_with_hint(path, hint.clone()),
        None => DataSource::file(path),
    }
}

/// Apply the command-line repairs to tasks that need them
async fn repair(importer: &Importer, ctx: &mut ImportContext, args: &ImportArgs, srs: Option<&Crs>) -> Result<()> {
    let hint_per_task = args.format.is_some() && !matches!(ctx.source(), DataSource::SingleFile { .. });

    for id in 0..ctx.tasks().len() {
        let task = ctx.task_mut(id)?;
        let mut touched = false;

        if hint_per_task && task.state() == TaskState::NoFormat {
            if let Some(hint) = &args.format {
                task.set_format_hint(hint.clone())?;
                touched = true;
            }
        }
        if let Some(crs) = srs {
            if task.state() == TaskState::NoCrs || touched {
                task.set_srs(crs.clone())?;
                touched = true;
            }
        }

        if touched {
            tracing::debug!(task_id = id, format = ?args.format, srs = ?srs.map(|c| c.code()), "Repairing task");
            importer.changed(ctx, id).await?;
        }
    }
    Ok(())
}

fn plan(ctx: &ImportContext) -> Vec<PlannedAction> {
    let workspace = ctx.target_workspace().unwrap_or_default().to_string();
    let mut actions = Vec::new();

    for task in ctx.tasks() {
        if task.state() != TaskState::Ready {
            actions.push(
                PlannedAction::new(ActionType::SkipTask, format!("Skip {} ({})", task.source(), task.state()))
                    .with_detail(task.message().unwrap_or("not ready").to_string()),
            );
            continue;
        }

        let format = task.format().map(|f| f.name()).unwrap_or("unknown");
        let crs = task.resource().crs.as_ref().map(|c| c.code()).unwrap_or_else(|| "-".to_string());
        if let Some(store) = ctx.target_store() {
            actions.push(
                PlannedAction::new(
                    ActionType::WriteTable,
                    format!("Write {} into table {} of store {}", task.source(), task.layer_name(), store.name),
                )
                .with_detail(format!("Format: {}", format))
                .with_detail(format!("Update mode: {}", task.update_mode())),
            );
        }
        actions.push(
            PlannedAction::new(ActionType::RegisterLayer, format!("Register layer {}:{}", workspace, task.layer_name()))
                .with_detail(format!("Source: {}", task.source()))
                .with_detail(format!("CRS: {}", crs)),
        );
    }

    if ctx.archive() && ctx.is_indirect() && !ctx.source().is_database() {
        actions.push(PlannedAction::new(
            ActionType::DeleteSource,
            format!("Delete {} once every task completes", ctx.source()),
        ));
    }
    actions
}

fn print_hints(output: &OutputWriter, importer: &Importer, ctx: &ImportContext) {
    let counts = ctx.state_counts();
    let count = |state: TaskState| counts.iter().find(|(s, _)| *s == state).map_or(0, |(_, n)| *n);

    let no_crs = count(TaskState::NoCrs);
    if no_crs > 0 {
        output.warning(format!(
            "{} task(s) have no coordinate reference system; rerun with --srs EPSG:<code>",
            no_crs
        ));
    }
    let no_bounds = count(TaskState::NoBounds);
    if no_bounds > 0 {
        output.warning(format!("{} task(s) have no extent; their features carry no geometry", no_bounds));
    }
    let no_format = count(TaskState::NoFormat);
    if no_format > 0 {
        output.warning(format!(
            "{} file(s) were not recognized; readable extensions are .{} (or pass --format)",
            no_format,
            importer.registry().supported_extensions().join(", .")
        ));
    }
    let bad_format = count(TaskState::BadFormat);
    if bad_format > 0 {
        output.warning(format!("{} task(s) cannot be stored in the target store", bad_format));
    }
    if ctx.state() == ContextState::Complete && ctx.archive() && ctx.is_indirect() {
        output.info("Source archived");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn import_args(argv: &[&str]) -> ImportArgs {
        let mut full = vec!["geocat", "import"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Import(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_infer_source_kinds() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().display().to_string();

        assert!(matches!(infer_source(&import_args(&[dir.as_str()])), DataSource::Directory { .. }));
        assert!(matches!(
            infer_source(&import_args(&["https://example.com/roads.zip"])),
            DataSource::RemoteArchive { .. }
        ));
        assert!(matches!(infer_source(&import_args(&["bundle.ZIP"])), DataSource::RemoteArchive { .. }));
        assert!(matches!(
            infer_source(&import_args(&["parcels", "--database"])),
            DataSource::Database { ref params } if params.url == "json://parcels"
        ));
        assert!(matches!(
            infer_source(&import_args(&["wells.txt", "--format", "csv"])),
            DataSource::SingleFile { format_hint: Some(ref h), .. } if h == "csv"
        ));
    }
}
