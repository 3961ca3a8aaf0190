//! Command implementations

mod config;
mod formats;
mod history;
mod import;
mod init;
mod layers;
mod store;
mod workspace;

use crate::cli::{Cli, Commands};
use crate::config::{find_workspace_root, WorkspaceLayout};
use crate::output::OutputWriter;
use anyhow::Result;

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let output = OutputWriter::new(cli.json);

    match cli.command {
        Commands::Init(args) => init::execute(args, &output, cli.dry_run).await,
        Commands::Import(args) => import::execute(args, &output, cli.dry_run).await,
        Commands::Store(args) => store::execute(args, &output, cli.dry_run).await,
        Commands::Workspace(args) => workspace::execute(args, &output, cli.dry_run).await,
        Commands::Layers(args) => layers::execute(args, &output).await,
        Commands::History(args) => history::execute(args, &output, cli.dry_run).await,
        Commands::Formats => formats::execute(&output),
        Commands::Config => config::execute(&output),
    }
}

/// Layout of the enclosing `.geocat` workspace
fn current_layout() -> Result<WorkspaceLayout> {
    Ok(WorkspaceLayout::new(find_workspace_root()?))
}
