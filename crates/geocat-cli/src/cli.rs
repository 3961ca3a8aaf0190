use clap::{Parser, Subcommand};
use geocat_core::models::UpdateMode;
use std::path::PathBuf;

/// GeoCat - Geospatial catalog import pipeline
#[derive(Parser, Debug)]
#[command(name = "geocat")]
#[command(about = "Import geospatial data into a layer catalog", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Show planned actions without executing them
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new GeoCat workspace
    Init(InitArgs),

    /// Import a file, directory, archive or database
    Import(ImportArgs),

    /// Manage target stores
    Store(StoreArgs),

    /// Manage catalog workspaces
    Workspace(WorkspaceArgs),

    /// List registered layers
    Layers(LayersArgs),

    /// Show or clear the import history
    History(HistoryArgs),

    /// List supported data formats
    Formats,

    /// Show the effective configuration and where each value comes from
    Config,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Workspace directory path (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Default catalog workspace for imports
    #[arg(long)]
    pub workspace: Option<String>,

    /// Force overwrite of the configuration if the workspace already exists
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// Path, archive locator (.zip path or http(s) URL) or database URL
    pub source: String,

    /// Catalog workspace the layers are published in
    #[arg(long, short = 'w')]
    pub workspace: Option<String>,

    /// Tabular store the data is copied into (registers in place when omitted)
    #[arg(long, short = 's')]
    pub store: Option<String>,

    /// What to do when the target layer already exists
    #[arg(long, value_parser = parse_update_mode)]
    pub update_mode: Option<UpdateMode>,

    /// CRS for tasks whose source declares none (e.g. EPSG:4326)
    #[arg(long, value_name = "CODE")]
    pub srs: Option<String>,

    /// Delete the source after a fully successful import into a store
    #[arg(long)]
    pub archive: bool,

    /// Force the format of a single file (e.g. csv, geojson)
    #[arg(long, value_name = "HINT")]
    pub format: Option<String>,

    /// Treat SOURCE as a database URL and import each of its tables
    #[arg(long)]
    pub database: bool,

    /// Do not scan features when a format reports no extent
    #[arg(long)]
    pub no_compute_bounds: bool,
}

fn parse_update_mode(s: &str) -> Result<UpdateMode, String> {
    s.parse::<UpdateMode>().map_err(|e| e.to_string())
}

#[derive(Parser, Debug)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub command: StoreCommand,
}

#[derive(Subcommand, Debug)]
pub enum StoreCommand {
    /// Register a tabular store backed by a workspace database
    Add(StoreAddArgs),

    /// List the stores of a workspace
    List(StoreListArgs),
}

#[derive(Parser, Debug)]
pub struct StoreAddArgs {
    /// Store name
    pub name: String,

    /// Database name or json:// URL (created under .geocat/databases when missing)
    #[arg(long)]
    pub database: String,

    /// Catalog workspace of the store (defaults to the configured one)
    #[arg(long, short = 'w')]
    pub workspace: Option<String>,
}

#[derive(Parser, Debug)]
pub struct StoreListArgs {
    #[arg(long, short = 'w')]
    pub workspace: Option<String>,
}

#[derive(Parser, Debug)]
pub struct WorkspaceArgs {
    #[command(subcommand)]
    pub command: WorkspaceCommand,
}

#[derive(Subcommand, Debug)]
pub enum WorkspaceCommand {
    /// Create a catalog workspace
    Add(WorkspaceAddArgs),

    /// List catalog workspaces
    List,
}

#[derive(Parser, Debug)]
pub struct WorkspaceAddArgs {
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct LayersArgs {
    /// Only list layers of this workspace
    #[arg(long, short = 'w')]
    pub workspace: Option<String>,
}

#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Show the tasks of one import context
    #[arg(long)]
    pub id: Option<u64>,

    /// Forget every recorded import
    #[arg(long)]
    pub clear: bool,
}
