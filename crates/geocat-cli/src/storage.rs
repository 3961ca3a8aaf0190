use anyhow::{Context, Result};
use geocat_core::config::LayeredConfig;
use geocat_core::models::ConnectionParams;
use geocat_core::ports::{Catalog, DatabaseConnector, TaskHistoryStore};
use geocat_import::{Importer, ImporterSettings};
use geocat_store::json::JSON_DATABASE_SCHEME;
use geocat_store::{JsonCatalog, JsonDatabaseConnector, JsonHistoryStore, MemoryHistoryStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::WorkspaceLayout;

/// Adapters of a `.geocat` workspace
pub struct Storage {
    pub catalog: Arc<dyn Catalog>,
    pub connector: Arc<JsonDatabaseConnector>,
    pub history: Arc<dyn TaskHistoryStore>,
    uploads_dir: PathBuf,
    /// Holds the uploads directory of a dry run
    _scratch: Option<TempDir>,
}

impl Storage {
    /// Open the workspace files
    ///
    /// With `dry_run` the history stays in memory and archives unpack into a
    /// scratch directory removed on drop.
    pub async fn open(layout: &WorkspaceLayout, dry_run: bool) -> Result<Self> {
        let catalog = JsonCatalog::open(layout.catalog_path())
            .await
            .context("Failed to open catalog.json")?;

        let history: Arc<dyn TaskHistoryStore> = if dry_run {
            Arc::new(MemoryHistoryStore::new())
        } else {
            Arc::new(
                JsonHistoryStore::open(layout.history_path())
                    .await
                    .context("Failed to open history.json")?,
            )
        };

        let scratch = if dry_run {
            Some(tempfile::Builder::new().prefix("geocat-dry-run-").tempdir()?)
        } else {
            None
        };
        let uploads_dir = match &scratch {
            Some(dir) => dir.path().to_path_buf(),
            None => layout.uploads_dir(),
        };

        tracing::debug!(
            root = %layout.root.display(),
            dry_run,
            uploads = %uploads_dir.display(),
            "Opened workspace storage"
        );
        Ok(Self {
            catalog: Arc::new(catalog),
            connector: Arc::new(JsonDatabaseConnector::new(layout.databases_dir())),
            history,
            uploads_dir,
            _scratch: scratch,
        })
    }

    /// Importer over these adapters, configured from `config`
    pub fn importer(&self, config: &LayeredConfig) -> Importer {
        let connector: Arc<dyn DatabaseConnector> = self.connector.clone();
        let settings = ImporterSettings {
            uploads_dir: Some(self.uploads_dir.clone()),
            ..ImporterSettings::from(config)
        };
        Importer::new(self.catalog.clone(), connector, self.history.clone()).with_settings(settings)
    }
}

/// Connection parameters for a database given by name or `json://` URL
pub fn database_params(database: &str) -> ConnectionParams {
    if database.contains("://") {
        ConnectionParams::new(database)
    } else {
        JsonDatabaseConnector::params(database)
    }
}

/// True when the URL is served by the workspace's database connector
pub fn is_workspace_database(params: &ConnectionParams) -> bool {
    params.url.starts_with(JSON_DATABASE_SCHEME)
}
