//! In-memory adapters for development and testing.
//!
//! These implementations use `RwLock::unwrap()` intentionally. Lock poisoning
//! only occurs when another thread panicked while holding the lock, which is
//! an unrecoverable state. For persistent catalogs, use the JSON-file adapters.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use geocat_core::error::{ImportError, Result};
use geocat_core::models::{
    ConnectionParams, ContextRecord, Feature, LayerInfo, StoreInfo, WorkspaceInfo,
};
use geocat_core::ports::{
    Catalog, CatalogChange, CommitOutcome, DatabaseConnector, TableSchema, TableStore,
    TaskHistoryStore,
};

use crate::state::{CatalogState, DatabaseState, HistoryState};

/// In-memory implementation of Catalog
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn workspace(&self, name: &str) -> Result<Option<WorkspaceInfo>> {
        Ok(self.state.read().unwrap().workspace(name).cloned())
    }

    async fn add_workspace(&self, workspace: WorkspaceInfo) -> Result<()> {
        self.state.write().unwrap().add_workspace(workspace)
    }

    async fn default_workspace(&self) -> Result<Option<WorkspaceInfo>> {
        Ok(self.state.read().unwrap().default_workspace().cloned())
    }

    async fn workspaces(&self) -> Result<Vec<WorkspaceInfo>> {
        Ok(self.state.read().unwrap().workspaces.clone())
    }

    async fn store(&self, workspace: &str, name: &str) -> Result<Option<StoreInfo>> {
        Ok(self.state.read().unwrap().store(workspace, name).cloned())
    }

    async fn stores(&self, workspace: &str) -> Result<Vec<StoreInfo>> {
        Ok(self.state.read().unwrap().stores(workspace))
    }

    async fn layer(&self, workspace: &str, name: &str) -> Result<Option<LayerInfo>> {
        Ok(self.state.read().unwrap().layer(workspace, name).cloned())
    }

    async fn layers(&self, workspace: Option<&str>) -> Result<Vec<LayerInfo>> {
        Ok(self.state.read().unwrap().layers(workspace))
    }

    async fn layer_names(&self, workspace: &str) -> Result<HashSet<String>> {
        Ok(self.state.read().unwrap().layer_names(workspace))
    }

    async fn commit(&self, change: CatalogChange) -> Result<CommitOutcome> {
        let mut state = self.state.write().unwrap();
        let snapshot = state.clone();
        let result = state.apply(change);
        if result.is_err() {
            *state = snapshot;
        }
        result
    }

    async fn remove_layer(&self, workspace: &str, name: &str) -> Result<bool> {
        Ok(self.state.write().unwrap().remove_layer(workspace, name))
    }
}

/// In-memory implementation of TableStore
#[derive(Debug, Clone, Default)]
pub struct MemoryTableStore {
    state: Arc<RwLock<DatabaseState>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.state.read().unwrap().list_tables())
    }

    async fn describe(&self, table: &str) -> Result<TableSchema> {
        Ok(self.state.read().unwrap().table(table)?.schema.clone())
    }

    async fn has_table(&self, table: &str) -> Result<bool> {
        Ok(self.state.read().unwrap().tables.contains_key(table))
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        self.state.write().unwrap().create_table(schema)
    }

    async fn insert(&self, table: &str, features: &[Feature]) -> Result<usize> {
        self.state.write().unwrap().insert(table, features)
    }

    async fn truncate(&self, table: &str) -> Result<()> {
        self.state.write().unwrap().truncate(table)
    }

    async fn count(&self, table: &str) -> Result<usize> {
        Ok(self.state.read().unwrap().table(table)?.rows.len())
    }

    async fn read(&self, table: &str) -> Result<Vec<Feature>> {
        Ok(self.state.read().unwrap().table(table)?.rows.clone())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.state.write().unwrap().drop_table(table)
    }
}

/// Connector over a fixed set of in-memory databases keyed by URL
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    databases: Arc<RwLock<HashMap<String, MemoryTableStore>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty database under `url`, or return the existing one
    pub fn add_database(&self, url: impl Into<String>) -> MemoryTableStore {
        let mut databases = self.databases.write().unwrap();
        databases.entry(url.into()).or_default().clone()
    }

    pub fn database(&self, url: &str) -> Option<MemoryTableStore> {
        self.databases.read().unwrap().get(url).cloned()
    }
}

#[async_trait]
impl DatabaseConnector for MemoryConnector {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn TableStore>> {
        match self.database(&params.url) {
            Some(store) => Ok(Arc::new(store)),
            None => Err(ImportError::DatabaseUnavailable {
                url: params.url.clone(),
                reason: "no such in-memory database".to_string(),
            }),
        }
    }
}

/// In-memory implementation of TaskHistoryStore
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    state: Arc<RwLock<HistoryState>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskHistoryStore for MemoryHistoryStore {
    async fn create(&self, record: ContextRecord) -> Result<u64> {
        Ok(self.state.write().unwrap().create(record))
    }

    async fn update(&self, record: ContextRecord) -> Result<()> {
        self.state.write().unwrap().update(record)
    }

    async fn get(&self, id: u64) -> Result<Option<ContextRecord>> {
        Ok(self.state.read().unwrap().records.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<ContextRecord>> {
        Ok(self.state.read().unwrap().records.values().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        self.state.write().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use geocat_core::models::{Geometry, ResourceDescriptor, StyleKind};
    use geocat_core::ports::LayerChange;

    fn layer(name: &str, store: &str) -> LayerInfo {
        LayerInfo {
            id: 0,
            name: name.to_string(),
            workspace: "topp".to_string(),
            store: store.to_string(),
            resource: ResourceDescriptor::default(),
            style: StyleKind::Point,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_first_workspace_becomes_default() {
        let catalog = MemoryCatalog::new();
        catalog.add_workspace(WorkspaceInfo::new("topp")).await.unwrap();
        catalog.add_workspace(WorkspaceInfo::new("sf")).await.unwrap();

        assert_eq!(catalog.default_workspace().await.unwrap().unwrap().name, "topp");
        assert_eq!(catalog.workspaces().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let catalog = MemoryCatalog::new();
        catalog.add_workspace(WorkspaceInfo::new("topp")).await.unwrap();

        // Store is created first, then the layer fails because its store is wrong
        let change = CatalogChange {
            workspace: None,
            store: Some(StoreInfo::tabular("topp", "db", ConnectionParams::new("mem://db"))),
            layer: Some(LayerChange::Add(layer("roads", "other"))),
        };
        assert!(catalog.commit(change).await.is_err());

        assert!(catalog.store("topp", "db").await.unwrap().is_none());
        assert!(catalog.layers(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_layer_is_rejected() {
        let catalog = MemoryCatalog::new();
        let change = CatalogChange {
            workspace: Some(WorkspaceInfo::new("topp")),
            store: Some(StoreInfo::tabular("topp", "db", ConnectionParams::new("mem://db"))),
            layer: Some(LayerChange::Add(layer("roads", "db"))),
        };
        catalog.commit(change.clone()).await.unwrap();

        let err = catalog.commit(change).await.unwrap_err();
        assert!(matches!(err, ImportError::LayerExists { .. }));
        assert_eq!(catalog.layer_names("topp").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_layer_update_keeps_id() {
        let catalog = MemoryCatalog::new();
        let change = CatalogChange {
            workspace: Some(WorkspaceInfo::new("topp")),
            store: Some(StoreInfo::tabular("topp", "db", ConnectionParams::new("mem://db"))),
            layer: Some(LayerChange::Add(layer("roads", "db"))),
        };
        let added = catalog.commit(change).await.unwrap().layer.unwrap();

        let mut updated = layer("roads", "db");
        updated.resource.feature_count = Some(42);
        let change = CatalogChange { layer: Some(LayerChange::Update(updated)), ..Default::default() };
        let outcome = catalog.commit(change).await.unwrap().layer.unwrap();

        assert_eq!(outcome.id, added.id);
        assert_eq!(outcome.resource.feature_count, Some(42));
        assert!(catalog.remove_layer("topp", "roads").await.unwrap());
        assert!(!catalog.remove_layer("topp", "roads").await.unwrap());
    }

    #[tokio::test]
    async fn test_table_store_operations() {
        let connector = MemoryConnector::new();
        connector.add_database("mem://db");
        let store = connector.connect(&ConnectionParams::new("mem://db")).await.unwrap();

        store.create_table(&TableSchema::new("roads")).await.unwrap();
        assert!(matches!(
            store.create_table(&TableSchema::new("roads")).await,
            Err(ImportError::TableExists { .. })
        ));

        let features = vec![Feature::new(Some(Geometry::point(1.0, 2.0))); 3];
        assert_eq!(store.insert("roads", &features).await.unwrap(), 3);
        assert_eq!(store.count("roads").await.unwrap(), 3);

        store.truncate("roads").await.unwrap();
        assert_eq!(store.count("roads").await.unwrap(), 0);

        store.drop_table("roads").await.unwrap();
        assert!(!store.has_table("roads").await.unwrap());
        assert!(matches!(store.count("roads").await, Err(ImportError::TableNotFound { .. })));
    }

    #[tokio::test]
    async fn test_unknown_database_is_unavailable() {
        let connector = MemoryConnector::new();
        let result = connector.connect(&ConnectionParams::new("mem://nope")).await;
        assert!(matches!(result, Err(ImportError::DatabaseUnavailable { .. })));
    }
}
