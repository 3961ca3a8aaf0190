use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;
use crate::models::{LayerInfo, StoreInfo, WorkspaceInfo};

/// Layer part of a catalog change
#[derive(Debug, Clone, PartialEq)]
pub enum LayerChange {
    /// Register a new layer; fails if the name is taken in the workspace
    Add(LayerInfo),
    /// Replace the resource and style of an existing layer, keeping its id
    Update(LayerInfo),
}

/// A set of catalog entities applied together by `Catalog::commit`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogChange {
    /// Workspace to create when it does not exist yet
    pub workspace: Option<WorkspaceInfo>,
    /// Store to create when it does not exist yet
    pub store: Option<StoreInfo>,
    pub layer: Option<LayerChange>,
}

impl CatalogChange {
    pub fn is_empty(&self) -> bool {
        self.workspace.is_none() && self.store.is_none() && self.layer.is_none()
    }
}

/// Entities as stored after a commit, with their assigned ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOutcome {
    pub store: Option<StoreInfo>,
    pub layer: Option<LayerInfo>,
}

/// Port for the resource catalog
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up a workspace by name
    async fn workspace(&self, name: &str) -> Result<Option<WorkspaceInfo>>;

    /// Create a workspace; the first one created becomes the default
    async fn add_workspace(&self, workspace: WorkspaceInfo) -> Result<()>;

    async fn default_workspace(&self) -> Result<Option<WorkspaceInfo>>;

    async fn workspaces(&self) -> Result<Vec<WorkspaceInfo>>;

    async fn store(&self, workspace: &str, name: &str) -> Result<Option<StoreInfo>>;

    /// All stores of a workspace
    async fn stores(&self, workspace: &str) -> Result<Vec<StoreInfo>>;

    async fn layer(&self, workspace: &str, name: &str) -> Result<Option<LayerInfo>>;

    /// All layers, optionally restricted to one workspace
    async fn layers(&self, workspace: Option<&str>) -> Result<Vec<LayerInfo>>;

    /// Names of all layers in a workspace
    async fn layer_names(&self, workspace: &str) -> Result<HashSet<String>>;

    /// Apply a change atomically: either every entity is persisted or none is
    async fn commit(&self, change: CatalogChange) -> Result<CommitOutcome>;

    /// Remove a layer, returning whether it existed
    async fn remove_layer(&self, workspace: &str, name: &str) -> Result<bool>;
}
