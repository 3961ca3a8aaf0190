use serde::{Deserialize, Serialize};
use std::fmt;

use super::geometry::{BoundingBox, Crs, GeometryType};

/// Whether a resource holds features or a grid coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    #[default]
    Vector,
    Raster,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Vector => f.write_str("vector"),
            DataKind::Raster => f.write_str("raster"),
        }
    }
}

/// Attribute value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    Date,
}

impl AttributeKind {
    /// Infer the attribute kind of a JSON value
    pub fn of_value(value: &serde_json::Value) -> Option<AttributeKind> {
        match value {
            serde_json::Value::Bool(_) => Some(AttributeKind::Boolean),
            serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Some(AttributeKind::Integer),
            serde_json::Value::Number(_) => Some(AttributeKind::Float),
            serde_json::Value::String(_) => Some(AttributeKind::String),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: AttributeKind,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self { name: name.into(), kind }
    }
}

/// Read parameters of a raster coverage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CoverageParams {
    pub width: u32,
    pub height: u32,
    pub band_count: u32,
    /// 1-based band indexes to publish; all bands when empty
    #[serde(default)]
    pub bands: Vec<u32>,
    /// Overview level to read; 0 is full resolution
    #[serde(default)]
    pub overview: u32,
}

impl CoverageParams {
    pub fn new(width: u32, height: u32, band_count: u32) -> Self {
        Self { width, height, band_count, bands: Vec::new(), overview: 0 }
    }

    /// Bands effectively read
    pub fn effective_bands(&self) -> Vec<u32> {
        if self.bands.is_empty() {
            (1..=self.band_count).collect()
        } else {
            self.bands.clone()
        }
    }
}

/// Metadata describing the resource an import task produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceDescriptor {
    /// Name of the table (indirect) or file (direct) backing the layer
    pub native_name: String,
    pub kind: DataKind,
    pub crs: Option<Crs>,
    pub native_bbox: Option<BoundingBox>,
    pub lat_lon_bbox: Option<BoundingBox>,
    #[serde(default)]
    pub attributes: Vec<AttributeDescriptor>,
    pub geometry_type: Option<GeometryType>,
    pub feature_count: Option<usize>,
    pub coverage: Option<CoverageParams>,
}

impl ResourceDescriptor {
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }
}
