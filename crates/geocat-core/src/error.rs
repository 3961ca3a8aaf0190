//! Error types for GeoCat

use std::path::PathBuf;
use thiserror::Error;

use crate::models::{TaskState, UpdateMode};

#[derive(Debug, Error)]
pub enum ImportError {
    // Source errors
    #[error("Source not found at {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Source unavailable at {location}: {reason}")]
    SourceUnavailable { location: String, reason: String },

    #[error("Nothing to import at {location}")]
    EmptySource { location: String },

    #[error("Cannot unpack archive {location}: {reason}")]
    Archive { location: String, reason: String },

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    // Format errors
    #[error("{format} error: {message}")]
    FormatError { format: String, message: String },

    #[error("No reader registered for format {format}")]
    ReaderMissing { format: String },

    // CRS errors
    #[error("Unknown coordinate reference system: {code}")]
    UnknownCrs { code: String },

    #[error("Cannot transform from {from} to {to}: {reason}")]
    CrsTransform {
        from: String,
        to: String,
        reason: String,
    },

    // Catalog errors
    #[error("Workspace not found: {name}")]
    WorkspaceNotFound { name: String },

    #[error("Store not found: {workspace}:{name}")]
    StoreNotFound { workspace: String, name: String },

    #[error("Store {store} cannot be used as an import target: {reason}")]
    InvalidTarget { store: String, reason: String },

    #[error("Resource {name} already exists in store {store}")]
    LayerExists { store: String, name: String },

    #[error("Catalog conflict: {reason}")]
    CatalogConflict { reason: String },

    // Database backend errors
    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    #[error("Table already exists: {table}")]
    TableExists { table: String },

    #[error("Database {url} unavailable: {reason}")]
    DatabaseUnavailable { url: String, reason: String },

    // Task state errors
    #[error("Invalid task transition from {from} to {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    #[error("Task {task_id} is {state} and can no longer be modified")]
    TaskTerminal { task_id: usize, state: TaskState },

    #[error("Task {task_id} not found in context {context_id}")]
    TaskNotFound { context_id: u64, task_id: usize },

    #[error("Import context not found: {id}")]
    ContextNotFound { id: u64 },

    #[error("Update mode {mode} is not supported: {reason}")]
    UnsupportedUpdateMode { mode: UpdateMode, reason: String },

    #[error("Transform {name} failed: {reason}")]
    Transform { name: String, reason: String },

    #[error("Import worker failed: {0}")]
    Worker(String),

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;
