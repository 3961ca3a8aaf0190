use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::geometry::GeometryType;
use super::resource::{DataKind, ResourceDescriptor};
use super::source::ConnectionParams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub name: String,
}

impl WorkspaceInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// How a store keeps its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// A file registered in place; holds vectors or rasters
    File,
    /// A database backend; holds vector tables only
    Tabular,
}

impl StoreKind {
    pub fn accepts(&self, kind: DataKind) -> bool {
        match self {
            StoreKind::File => true,
            StoreKind::Tabular => kind == DataKind::Vector,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::File => f.write_str("file"),
            StoreKind::Tabular => f.write_str("tabular"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConnection {
    File { path: PathBuf, format: String },
    Database(ConnectionParams),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreInfo {
    /// Assigned by the catalog on commit; 0 until then
    pub id: u64,
    pub name: String,
    pub workspace: String,
    pub kind: StoreKind,
    pub connection: StoreConnection,
}

impl StoreInfo {
    pub fn file(workspace: impl Into<String>, name: impl Into<String>, path: PathBuf, format: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            workspace: workspace.into(),
            kind: StoreKind::File,
            connection: StoreConnection::File { path, format: format.into() },
        }
    }

    pub fn tabular(workspace: impl Into<String>, name: impl Into<String>, params: ConnectionParams) -> Self {
        Self {
            id: 0,
            name: name.into(),
            workspace: workspace.into(),
            kind: StoreKind::Tabular,
            connection: StoreConnection::Database(params),
        }
    }

    pub fn connection_params(&self) -> Option<&ConnectionParams> {
        match &self.connection {
            StoreConnection::Database(params) => Some(params),
            StoreConnection::File { .. } => None,
        }
    }
}

/// Default style assigned to a layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleKind {
    Point,
    Line,
    Polygon,
    Raster,
    Generic,
    Named(String),
}

impl StyleKind {
    /// Pick a style from the kind of data and its geometry type
    pub fn for_resource(kind: DataKind, geometry_type: Option<GeometryType>) -> Self {
        if kind == DataKind::Raster {
            return StyleKind::Raster;
        }
        match geometry_type {
            Some(GeometryType::Point | GeometryType::MultiPoint) => StyleKind::Point,
            Some(GeometryType::LineString | GeometryType::MultiLineString) => StyleKind::Line,
            Some(GeometryType::Polygon | GeometryType::MultiPolygon) => StyleKind::Polygon,
            Some(GeometryType::Mixed) | None => StyleKind::Generic,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            StyleKind::Point => "point",
            StyleKind::Line => "line",
            StyleKind::Polygon => "polygon",
            StyleKind::Raster => "raster",
            StyleKind::Generic => "generic",
            StyleKind::Named(name) => name,
        }
    }
}

impl fmt::Display for StyleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A published layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    /// Assigned by the catalog on commit; 0 until then
    pub id: u64,
    pub name: String,
    pub workspace: String,
    pub store: String,
    pub resource: ResourceDescriptor,
    pub style: StyleKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
