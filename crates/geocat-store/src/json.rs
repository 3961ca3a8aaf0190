//! JSON-file adapters used by the CLI workspace (`.geocat/`)
//!
//! Each adapter keeps its state in memory and rewrites the whole file after
//! every successful mutation. Files are replaced through a temporary sibling
//! and a rename so a crash never leaves a truncated document behind.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use geocat_core::error::{ImportError, Result};
use geocat_core::models::{ConnectionParams, ContextRecord, Feature, LayerInfo, StoreInfo, WorkspaceInfo};
use geocat_core::ports::{
    Catalog, CatalogChange, CommitOutcome, DatabaseConnector, TableSchema, TableStore,
    TaskHistoryStore,
};

use crate::state::{CatalogState, DatabaseState, HistoryState};

/// URL scheme understood by [`JsonDatabaseConnector`]
pub const JSON_DATABASE_SCHEME: &str = "json://";

/// A serde document mirrored in memory
#[derive(Debug)]
struct JsonFile<T> {
    path: PathBuf,
    state: Mutex<T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send,
{
    /// Load the document, starting empty when the file does not exist
    async fn open(path: PathBuf) -> Result<Self> {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => T::default(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ImportError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, state: Mutex::new(state) })
    }

    async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    /// Apply `f` to a copy, persist it, then publish it; any failure keeps the old state
    async fn update<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> Result<R> + Send,
        R: Send,
    {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let value = f(&mut next)?;
        save_json(&self.path, &next).await?;
        *state = next;
        Ok(value)
    }
}

async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| ImportError::Serialization(format!("Failed to serialize: {}", e)))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Catalog persisted to a single JSON file
#[derive(Debug)]
pub struct JsonCatalog {
    file: JsonFile<CatalogState>,
}

impl JsonCatalog {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let file = JsonFile::open(path.into()).await?;
        tracing::debug!(path = %file.path.display(), "Opened catalog");
        Ok(Self { file })
    }
}

#[async_trait]
impl Catalog for JsonCatalog {
    async fn workspace(&self, name: &str) -> Result<Option<WorkspaceInfo>> {
        Ok(self.file.read(|s| s.workspace(name).cloned()).await)
    }

    async fn add_workspace(&self, workspace: WorkspaceInfo) -> Result<()> {
        self.file.update(|s| s.add_workspace(workspace)).await
    }

    async fn default_workspace(&self) -> Result<Option<WorkspaceInfo>> {
        Ok(self.file.read(|s| s.default_workspace().cloned()).await)
    }

    async fn workspaces(&self) -> Result<Vec<WorkspaceInfo>> {
        Ok(self.file.read(|s| s.workspaces.clone()).await)
    }

    async fn store(&self, workspace: &str, name: &str) -> Result<Option<StoreInfo>> {
        Ok(self.file.read(|s| s.store(workspace, name).cloned()).await)
    }

    async fn stores(&self, workspace: &str) -> Result<Vec<StoreInfo>> {
        Ok(self.file.read(|s| s.stores(workspace)).await)
    }

    async fn layer(&self, workspace: &str, name: &str) -> Result<Option<LayerInfo>> {
        Ok(self.file.read(|s| s.layer(workspace, name).cloned()).await)
    }

    async fn layers(&self, workspace: Option<&str>) -> Result<Vec<LayerInfo>> {
        Ok(self.file.read(|s| s.layers(workspace)).await)
    }

    async fn layer_names(&self, workspace: &str) -> Result<HashSet<String>> {
        Ok(self.file.read(|s| s.layer_names(workspace)).await)
    }

    async fn commit(&self, change: CatalogChange) -> Result<CommitOutcome> {
        self.file.update(|s| s.apply(change)).await
    }

    async fn remove_layer(&self, workspace: &str, name: &str) -> Result<bool> {
        self.file.update(|s| Ok(s.remove_layer(workspace, name))).await
    }
}

/// One database stored as a JSON file of tables
#[derive(Debug)]
pub struct JsonTableStore {
    file: JsonFile<DatabaseState>,
}

#[async_trait]
impl TableStore for JsonTableStore {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.file.read(|s| s.list_tables()).await)
    }

    async fn describe(&self, table: &str) -> Result<TableSchema> {
        self.file.read(|s| s.table(table).map(|t| t.schema.clone())).await
    }

    async fn has_table(&self, table: &str) -> Result<bool> {
        Ok(self.file.read(|s| s.tables.contains_key(table)).await)
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        self.file.update(|s| s.create_table(schema)).await
    }

    async fn insert(&self, table: &str, features: &[Feature]) -> Result<usize> {
        self.file.update(|s| s.insert(table, features)).await
    }

    async fn truncate(&self, table: &str) -> Result<()> {
        self.file.update(|s| s.truncate(table)).await
    }

    async fn count(&self, table: &str) -> Result<usize> {
        self.file.read(|s| s.table(table).map(|t| t.rows.len())).await
    }

    async fn read(&self, table: &str) -> Result<Vec<Feature>> {
        self.file.read(|s| s.table(table).map(|t| t.rows.clone())).await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.file.update(|s| s.drop_table(table)).await
    }
}

/// Connector for `json://<name>` databases kept under one directory
///
/// Database `json://parcels` lives in `<root>/parcels.json`. Connections are
/// shared so that every caller sees the same in-memory state.
#[derive(Debug, Clone)]
pub struct JsonDatabaseConnector {
    root: PathBuf,
    open: Arc<Mutex<HashMap<PathBuf, Arc<JsonTableStore>>>>,
}

impl JsonDatabaseConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), open: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Build the connection parameters for a database name
    pub fn params(name: &str) -> ConnectionParams {
        ConnectionParams::new(format!("{}{}", JSON_DATABASE_SCHEME, name))
    }

    fn database_path(&self, url: &str) -> Result<PathBuf> {
        let name = url.strip_prefix(JSON_DATABASE_SCHEME).ok_or_else(|| {
            ImportError::DatabaseUnavailable {
                url: url.to_string(),
                reason: format!("expected a {} URL", JSON_DATABASE_SCHEME),
            }
        })?;

        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ImportError::DatabaseUnavailable {
                url: url.to_string(),
                reason: "database names may only contain letters, digits, '_' and '-'".to_string(),
            });
        }

        Ok(self.root.join(format!("{}.json", name)))
    }

    /// Create an empty database file; existing databases are left untouched
    pub async fn create_database(&self, params: &ConnectionParams) -> Result<()> {
        let path = self.database_path(&params.url)?;
        if !tokio::fs::try_exists(&path).await? {
            save_json(&path, &DatabaseState::default()).await?;
            tracing::info!(url = %params.url, path = %path.display(), "Created database");
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseConnector for JsonDatabaseConnector {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn TableStore>> {
        let path = self.database_path(&params.url)?;

        let mut open = self.open.lock().await;
        if let Some(store) = open.get(&path) {
            return Ok(store.clone());
        }

        if !tokio::fs::try_exists(&path).await? {
            return Err(ImportError::DatabaseUnavailable {
                url: params.url.clone(),
                reason: format!("{} does not exist", path.display()),
            });
        }

        let store = Arc::new(JsonTableStore { file: JsonFile::open(path.clone()).await? });
        open.insert(path, store.clone());
        Ok(store)
    }
}

/// Task history persisted to a JSON file
#[derive(Debug)]
pub struct JsonHistoryStore {
    file: JsonFile<HistoryState>,
}

impl JsonHistoryStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self { file: JsonFile::open(path.into()).await? })
    }
}

#[async_trait]
impl TaskHistoryStore for JsonHistoryStore {
    async fn create(&self, record: ContextRecord) -> Result<u64> {
        self.file.update(|s| Ok(s.create(record))).await
    }

    async fn update(&self, record: ContextRecord) -> Result<()> {
        self.file.update(|s| s.update(record)).await
    }

    async fn get(&self, id: u64) -> Result<Option<ContextRecord>> {
        Ok(self.file.read(|s| s.records.get(&id).cloned()).await)
    }

    async fn list(&self) -> Result<Vec<ContextRecord>> {
        Ok(self.file.read(|s| s.records.values().cloned().collect()).await)
    }

    async fn clear(&self) -> Result<()> {
        self.file
            .update(|s| {
                s.clear();
                Ok(())
            })
            .await
    }
}
