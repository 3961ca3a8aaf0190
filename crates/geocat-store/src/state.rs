//! Plain data held by both the memory and the JSON-file adapters
//!
//! Every mutation validates against the current state before touching it, so
//! a failed call leaves the state unchanged.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use geocat_core::error::{ImportError, Result};
use geocat_core::models::{ContextRecord, Feature, LayerInfo, StoreInfo, WorkspaceInfo};
use geocat_core::ports::{CatalogChange, CommitOutcome, LayerChange, TableSchema};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CatalogState {
    #[serde(default)]
    pub workspaces: Vec<WorkspaceInfo>,
    #[serde(default)]
    pub default_workspace: Option<String>,
    #[serde(default)]
    pub stores: Vec<StoreInfo>,
    #[serde(default)]
    pub layers: Vec<LayerInfo>,
    #[serde(default = "first_id")]
    pub next_store_id: u64,
    #[serde(default = "first_id")]
    pub next_layer_id: u64,
}

fn first_id() -> u64 {
    1
}

impl Default for CatalogState {
    fn default() -> Self {
        Self {
            workspaces: Vec::new(),
            default_workspace: None,
            stores: Vec::new(),
            layers: Vec::new(),
            next_store_id: first_id(),
            next_layer_id: first_id(),
        }
    }
}

impl CatalogState {
    pub fn workspace(&self, name: &str) -> Option<&WorkspaceInfo> {
        self.workspaces.iter().find(|w| w.name == name)
    }

    pub fn add_workspace(&mut self, workspace: WorkspaceInfo) -> Result<()> {
        if self.workspace(&workspace.name).is_some() {
            return Err(ImportError::CatalogConflict {
                reason: format!("workspace '{}' already exists", workspace.name),
            });
        }
        if self.default_workspace.is_none() {
            self.default_workspace = Some(workspace.name.clone());
        }
        self.workspaces.push(workspace);
        Ok(())
    }

    pub fn default_workspace(&self) -> Option<&WorkspaceInfo> {
        self.default_workspace.as_deref().and_then(|name| self.workspace(name))
    }

    pub fn store(&self, workspace: &str, name: &str) -> Option<&StoreInfo> {
        self.stores.iter().find(|s| s.workspace == workspace && s.name == name)
    }

    pub fn stores(&self, workspace: &str) -> Vec<StoreInfo> {
        self.stores.iter().filter(|s| s.workspace == workspace).cloned().collect()
    }

    pub fn layer(&self, workspace: &str, name: &str) -> Option<&LayerInfo> {
        self.layers.iter().find(|l| l.workspace == workspace && l.name == name)
    }

    pub fn layers(&self, workspace: Option<&str>) -> Vec<LayerInfo> {
        self.layers
            .iter()
            .filter(|l| workspace.is_none_or(|w| l.workspace == w))
            .cloned()
            .collect()
    }

    pub fn layer_names(&self, workspace: &str) -> HashSet<String> {
        self.layers.iter().filter(|l| l.workspace == workspace).map(|l| l.name.clone()).collect()
    }

    pub fn remove_layer(&mut self, workspace: &str, name: &str) -> bool {
        let before = self.layers.len();
        self.layers.retain(|l| !(l.workspace == workspace && l.name == name));
        self.layers.len() != before
    }

    /// Apply a change. On error the state may be partially modified; callers
    /// restore their snapshot.
    pub fn apply(&mut self, change: CatalogChange) -> Result<CommitOutcome> {
        let mut outcome = CommitOutcome::default();

        if let Some(workspace) = change.workspace {
            if self.workspace(&workspace.name).is_none() {
                self.add_workspace(workspace)?;
            }
        }

        if let Some(mut store) = change.store {
            if self.workspace(&store.workspace).is_none() {
                return Err(ImportError::WorkspaceNotFound { name: store.workspace });
            }
            match self.store(&store.workspace, &store.name) {
                Some(existing) if existing.connection == store.connection => {
                    outcome.store = Some(existing.clone());
                }
                Some(existing) => {
                    return Err(ImportError::CatalogConflict {
                        reason: format!(
                            "store '{}' already exists in workspace '{}' with another connection",
                            existing.name, existing.workspace
                        ),
                    });
                }
                None => {
                    store.id = self.next_store_id;
                    self.next_store_id += 1;
                    self.stores.push(store.clone());
                    outcome.store = Some(store);
                }
            }
        }

        match change.layer {
            Some(LayerChange::Add(mut layer)) => {
                self.check_layer_target(&layer)?;
                if self.layer(&layer.workspace, &layer.name).is_some() {
                    return Err(ImportError::LayerExists { store: layer.store, name: layer.name });
                }
                layer.id = self.next_layer_id;
                self.next_layer_id += 1;
                self.layers.push(layer.clone());
                outcome.layer = Some(layer);
            }
            Some(LayerChange::Update(layer)) => {
                self.check_layer_target(&layer)?;
                let existing = self
                    .layers
                    .iter_mut()
                    .find(|l| l.workspace == layer.workspace && l.name == layer.name)
                    .ok_or_else(|| ImportError::CatalogConflict {
                        reason: format!(
                            "layer '{}' does not exist in workspace '{}'",
                            layer.name, layer.workspace
                        ),
                    })?;
                existing.store = layer.store;
                existing.resource = layer.resource;
                existing.style = layer.style;
                existing.updated_at = Utc::now();
                outcome.layer = Some(existing.clone());
            }
            None => {}
        }

        Ok(outcome)
    }

    fn check_layer_target(&self, layer: &LayerInfo) -> Result<()> {
        if self.workspace(&layer.workspace).is_none() {
            return Err(ImportError::WorkspaceNotFound { name: layer.workspace.clone() });
        }
        if self.store(&layer.workspace, &layer.store).is_none() {
            return Err(ImportError::StoreNotFound {
                workspace: layer.workspace.clone(),
                name: layer.store.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TableData {
    pub schema: TableSchema,
    #[serde(default)]
    pub rows: Vec<Feature>,
}

/// Tables of one database, keyed by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct DatabaseState {
    #[serde(default)]
    pub tables: BTreeMap<String, TableData>,
}

impl DatabaseState {
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn table(&self, name: &str) -> Result<&TableData> {
        self.tables.get(name).ok_or_else(|| ImportError::TableNotFound { table: name.to_string() })
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableData> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| ImportError::TableNotFound { table: name.to_string() })
    }

    pub fn create_table(&mut self, schema: &TableSchema) -> Result<()> {
        if self.tables.contains_key(&schema.name) {
            return Err(ImportError::TableExists { table: schema.name.clone() });
        }
        self.tables
            .insert(schema.name.clone(), TableData { schema: schema.clone(), rows: Vec::new() });
        Ok(())
    }

    pub fn insert(&mut self, table: &str, features: &[Feature]) -> Result<usize> {
        let data = self.table_mut(table)?;
        data.rows.extend_from_slice(features);
        Ok(features.len())
    }

    pub fn truncate(&mut self, table: &str) -> Result<()> {
        self.table_mut(table)?.rows.clear();
        Ok(())
    }

    pub fn drop_table(&mut self, table: &str) -> Result<()> {
        self.tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| ImportError::TableNotFound { table: table.to_string() })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct HistoryState {
    #[serde(default = "first_id")]
    pub next_id: u64,
    #[serde(default)]
    pub records: BTreeMap<u64, ContextRecord>,
}

impl Default for HistoryState {
    fn default() -> Self {
        Self { next_id: first_id(), records: BTreeMap::new() }
    }
}

impl HistoryState {
    pub fn create(&mut self, mut record: ContextRecord) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        record.id = id;
        self.records.insert(id, record);
        id
    }

    pub fn update(&mut self, record: ContextRecord) -> Result<()> {
        match self.records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(ImportError::ContextNotFound { id: record.id }),
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
