//! Turning a finished task into catalog entities
//!
//! Names are made unique per workspace, extents are reprojected to WGS 84 for
//! the geographic bbox, and workspace, store and layer are committed in one
//! `Catalog::commit` call so nobody observes a half-registered layer.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

use geocat_core::error::Result;
use geocat_core::models::{
    BoundingBox, ConnectionParams, Crs, LayerInfo, ResourceDescriptor, StoreConnection, StoreInfo,
    StyleKind, WorkspaceInfo,
};
use geocat_core::ports::{Catalog, CatalogChange, CommitOutcome, LayerChange};
use geocat_geo::CrsTransformer;

/// Fallback for names with no usable character
pub const DEFAULT_NAME: &str = "layer";

/// Make a candidate name safe: only `[A-Za-z0-9_-]`, no runs of `_`, no
/// leading digit.
pub fn normalize_name(candidate: &str) -> String {
    let mut name = String::with_capacity(candidate.len());
    for c in candidate.trim().chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' };
        if c == '_' && name.ends_with('_') {
            continue;
        }
        name.push(c);
    }

    if name.is_empty() || name == "_" {
        return DEFAULT_NAME.to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// `base` when free, else `base` followed by the lowest free integer suffix
pub fn unique_name(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (0u64..)
        .map(|i| format!("{}{}", base, i))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Catalog side of the import: naming, extents, styles and the commit
#[derive(Clone)]
pub struct CatalogBridge {
    catalog: Arc<dyn Catalog>,
    transformer: Arc<dyn CrsTransformer>,
}

impl CatalogBridge {
    pub fn new(catalog: Arc<dyn Catalog>, transformer: Arc<dyn CrsTransformer>) -> Self {
        Self { catalog, transformer }
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn transformer(&self) -> &Arc<dyn CrsTransformer> {
        &self.transformer
    }

    /// Unique, normalized layer name in `workspace`
    pub async fn unique_layer_name(&self, workspace: &str, candidate: &str) -> Result<String> {
        let taken = self.catalog.layer_names(workspace).await?;
        Ok(unique_name(&normalize_name(candidate), &taken))
    }

    /// Unique, normalized store name in `workspace`
    pub async fn unique_store_name(&self, workspace: &str, candidate: &str) -> Result<String> {
        let taken: HashSet<String> =
            self.catalog.stores(workspace).await?.into_iter().map(|s| s.name).collect();
        Ok(unique_name(&normalize_name(candidate), &taken))
    }

    /// Existing store of the workspace with exactly this connection
    pub async fn store_with_connection(
        &self,
        workspace: &str,
        connection: &StoreConnection,
    ) -> Result<Option<StoreInfo>> {
        Ok(self.catalog.stores(workspace).await?.into_iter().find(|s| &s.connection == connection))
    }

    /// Store for registering a database table in place, reusing a matching one
    pub async fn table_store(&self, workspace: &str, params: &ConnectionParams) -> Result<StoreInfo> {
        let connection = StoreConnection::Database(params.clone());
        if let Some(existing) = self.store_with_connection(workspace, &connection).await? {
            return Ok(existing);
        }
        let name = self.unique_store_name(workspace, database_name(params)).await?;
        Ok(StoreInfo::tabular(workspace, name, params.clone()))
    }

    /// Geographic (EPSG:4326) extent of a native bbox; `None` without a CRS
    pub fn lat_lon_bbox(&self, native: &BoundingBox) -> Result<Option<BoundingBox>> {
        if native.crs.is_none() {
            return Ok(None);
        }
        self.transformer.transform_bbox(native, &Crs::wgs84()).map(Some)
    }

    /// Fill in the native and geographic extents of a resource
    pub fn apply_bounds(&self, resource: &mut ResourceDescriptor, native: BoundingBox) -> Result<()> {
        let native = match native.crs {
            Some(_) => native,
            None => native.with_crs(resource.crs.clone()),
        };
        resource.lat_lon_bbox = self.lat_lon_bbox(&native)?;
        resource.native_bbox = Some(native);
        Ok(())
    }

    /// Layer entity for a resource, with the requested or default style
    pub fn layer(
        &self,
        workspace: &str,
        store: &str,
        name: &str,
        resource: ResourceDescriptor,
        style: Option<&StyleKind>,
    ) -> LayerInfo {
        let style = style
            .cloned()
            .unwrap_or_else(|| StyleKind::for_resource(resource.kind, resource.geometry_type));
        let now = Utc::now();
        LayerInfo {
            id: 0,
            name: name.to_string(),
            workspace: workspace.to_string(),
            store: store.to_string(),
            resource,
            style,
            created_at: now,
            updated_at: now,
        }
    }

    /// Commit workspace (when missing), store (when new) and layer together
    pub async fn register(
        &self,
        workspace: &str,
        store: Option<StoreInfo>,
        layer: LayerChange,
    ) -> Result<CommitOutcome> {
        let workspace = match self.catalog.workspace(workspace).await? {
            Some(_) => None,
            None => Some(WorkspaceInfo::new(workspace)),
        };
        let change = CatalogChange { workspace, store, layer: Some(layer) };
        let outcome = self.catalog.commit(change).await?;

        if let Some(layer) = &outcome.layer {
            tracing::info!(
                workspace = %layer.workspace,
                store = %layer.store,
                layer = %layer.name,
                style = %layer.style,
                "Layer registered"
            );
        }
        Ok(outcome)
    }
}

/// Short name of a database for naming its store
fn database_name(params: &ConnectionParams) -> &str {
    let url = params.url.trim_end_matches('/');
    let tail = url.rsplit(['/', ':']).next().unwrap_or(url);
    let tail = tail.split('?').next().unwrap_or(tail);
    if tail.is_empty() {
        "database"
    } else {
        tail
    }
}
