//! Content transforms applied while importing
//!
//! A task owns one [`TransformChain`]. Vector units see every feature in
//! chain order and may rewrite or reject it; raster units rewrite the coverage
//! read parameters. A rejection skips the feature, an `Err` fails the task.

use std::fmt;

use geocat_core::error::{ImportError, Result};
use geocat_core::models::{
    AttributeDescriptor, AttributeKind, CoverageParams, Crs, Feature, Geometry, GeometryType,
};
use geocat_geo::validation::validate_geometry;

/// What a transform knows about the task it runs in
#[derive(Debug, Clone, Default)]
pub struct TransformContext {
    pub context_id: u64,
    pub task_id: usize,
    pub layer_name: String,
    pub crs: Option<Crs>,
}

/// Result of a vector transform
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Keep(Feature),
    Reject(String),
}

pub trait VectorTransform: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, feature: Feature, ctx: &TransformContext) -> Result<Outcome>;

    /// Attribute schema after this transform
    fn attributes(&self, attributes: Vec<AttributeDescriptor>) -> Vec<AttributeDescriptor> {
        attributes
    }

    /// Geometry type after this transform
    fn geometry_type(&self, geometry_type: Option<GeometryType>) -> Option<GeometryType> {
        geometry_type
    }
}

pub trait RasterTransform: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, params: CoverageParams, ctx: &TransformContext) -> Result<CoverageParams>;
}

pub enum TransformUnit {
    Vector(Box<dyn VectorTransform>),
    Raster(Box<dyn RasterTransform>),
}

impl TransformUnit {
    pub fn vector(transform: impl VectorTransform + 'static) -> Self {
        TransformUnit::Vector(Box::new(transform))
    }

    pub fn raster(transform: impl RasterTransform + 'static) -> Self {
        TransformUnit::Raster(Box::new(transform))
    }

    pub fn name(&self) -> &str {
        match self {
            TransformUnit::Vector(t) => t.name(),
            TransformUnit::Raster(t) => t.name(),
        }
    }
}

/// Ordered list of transforms owned by a task
#[derive(Default)]
pub struct TransformChain {
    units: Vec<TransformUnit>,
}

impl fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.units.iter().map(|u| u.name())).finish()
    }
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a unit at the end of the chain
    pub fn add(&mut self, unit: TransformUnit) -> &mut Self {
        self.units.push(unit);
        self
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.units.iter().map(|u| u.name().to_string()).collect()
    }

    fn vector_units(&self) -> impl Iterator<Item = &(dyn VectorTransform + 'static)> {
        self.units.iter().filter_map(|u| match u {
            TransformUnit::Vector(t) => Some(t.as_ref()),
            TransformUnit::Raster(_) => None,
        })
    }

    /// Run a feature through every vector unit, stopping at the first rejection
    pub fn apply_vector(&self, feature: Feature, ctx: &TransformContext) -> Result<Outcome> {
        let mut current = feature;
        for unit in self.vector_units() {
            match unit.apply(current, ctx)? {
                Outcome::Keep(next) => current = next,
                Outcome::Reject(reason) => {
                    tracing::trace!(transform = unit.name(), reason = %reason, "Feature rejected");
                    return Ok(Outcome::Reject(reason));
                }
            }
        }
        Ok(Outcome::Keep(current))
    }

    pub fn apply_raster(&self, params: CoverageParams, ctx: &TransformContext) -> Result<CoverageParams> {
        let mut current = params;
        for unit in &self.units {
            if let TransformUnit::Raster(t) = unit {
                current = t.apply(current, ctx)?;
            }
        }
        Ok(current)
    }

    pub fn attributes(&self, attributes: Vec<AttributeDescriptor>) -> Vec<AttributeDescriptor> {
        self.vector_units().fold(attributes, |acc, t| t.attributes(acc))
    }

    pub fn geometry_type(&self, geometry_type: Option<GeometryType>) -> Option<GeometryType> {
        self.vector_units().fold(geometry_type, |acc, t| t.geometry_type(acc))
    }
}

/// Keep only the named attributes
#[derive(Debug, Clone)]
pub struct AttributeLimit {
    keep: Vec<String>,
}

impl AttributeLimit {
    pub fn new<I, S>(keep: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { keep: keep.into_iter().map(Into::into).collect() }
    }
}

impl VectorTransform for AttributeLimit {
    fn name(&self) -> &str {
        "attribute-limit"
    }

    fn apply(&self, mut feature: Feature, _ctx: &TransformContext) -> Result<Outcome> {
        feature.properties.retain(|key, _| self.keep.contains(key));
        Ok(Outcome::Keep(feature))
    }

    fn attributes(&self, mut attributes: Vec<AttributeDescriptor>) -> Vec<AttributeDescriptor> {
        attributes.retain(|a| self.keep.contains(&a.name));
        attributes
    }
}

#[derive(Debug, Clone)]
pub struct AttributeRename {
    from: String,
    to: String,
}

impl AttributeRename {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into() }
    }
}

impl VectorTransform for AttributeRename {
    fn name(&self) -> &str {
        "attribute-rename"
    }

    fn apply(&self, mut feature: Feature, _ctx: &TransformContext) -> Result<Outcome> {
        if let Some(value) = feature.properties.remove(&self.from) {
            feature.properties.insert(self.to.clone(), value);
        }
        Ok(Outcome::Keep(feature))
    }

    fn attributes(&self, mut attributes: Vec<AttributeDescriptor>) -> Vec<AttributeDescriptor> {
        for attribute in attributes.iter_mut().filter(|a| a.name == self.from) {
            attribute.name = self.to.clone();
        }
        attributes
    }
}

/// Build point geometries from two coordinate columns
#[derive(Debug, Clone)]
pub struct CoordinatesToPoint {
    x: String,
    y: String,
}

impl CoordinatesToPoint {
    pub fn new(x: impl Into<String>, y: impl Into<String>) -> Self {
        Self { x: x.into(), y: y.into() }
    }

    fn ordinate(feature: &Feature, column: &str) -> std::result::Result<f64, String> {
        let value = feature.property(column).ok_or_else(|| format!("missing column {}", column))?;
        let number = match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        number
            .filter(|n| n.is_finite())
            .ok_or_else(|| format!("column {} is not numeric: {}", column, value))
    }
}

impl VectorTransform for CoordinatesToPoint {
    fn name(&self) -> &str {
        "coordinates-to-point"
    }

    fn apply(&self, mut feature: Feature, _ctx: &TransformContext) -> Result<Outcome> {
        let x = match Self::ordinate(&feature, &self.x) {
            Ok(x) => x,
            Err(reason) => return Ok(Outcome::Reject(reason)),
        };
        let y = match Self::ordinate(&feature, &self.y) {
            Ok(y) => y,
            Err(reason) => return Ok(Outcome::Reject(reason)),
        };
        feature.geometry = Some(Geometry::point(x, y));
        Ok(Outcome::Keep(feature))
    }

    fn geometry_type(&self, _geometry_type: Option<GeometryType>) -> Option<GeometryType> {
        Some(GeometryType::Point)
    }

    fn attributes(&self, mut attributes: Vec<AttributeDescriptor>) -> Vec<AttributeDescriptor> {
        for attribute in attributes.iter_mut().filter(|a| a.name == self.x || a.name == self.y) {
            attribute.kind = AttributeKind::Float;
        }
        attributes
    }
}

/// Reject features whose geometry is structurally invalid
#[derive(Debug, Clone, Default)]
pub struct DropInvalidGeometry;

impl VectorTransform for DropInvalidGeometry {
    fn name(&self) -> &str {
        "drop-invalid-geometry"
    }

    fn apply(&self, feature: Feature, _ctx: &TransformContext) -> Result<Outcome> {
        let Some(geometry) = &feature.geometry else {
            return Ok(Outcome::Keep(feature));
        };
        let validation = validate_geometry(geometry);
        if validation.is_valid {
            Ok(Outcome::Keep(feature))
        } else {
            let reason = validation.first_reason().unwrap_or("invalid geometry").to_string();
            Ok(Outcome::Reject(reason))
        }
    }
}

/// Reject features without geometry or with an empty one
#[derive(Debug, Clone, Default)]
pub struct DropEmptyGeometry;

impl VectorTransform for DropEmptyGeometry {
    fn name(&self) -> &str {
        "drop-empty-geometry"
    }

    fn apply(&self, feature: Feature, _ctx: &TransformContext) -> Result<Outcome> {
        match &feature.geometry {
            Some(geometry) if !geometry.is_empty() => Ok(Outcome::Keep(feature)),
            Some(_) => Ok(Outcome::Reject("empty geometry".to_string())),
            None => Ok(Outcome::Reject("no geometry".to_string())),
        }
    }
}

/// Publish a subset of bands (1-based)
#[derive(Debug, Clone)]
pub struct SelectBands {
    bands: Vec<u32>,
}

impl SelectBands {
    pub fn new(bands: Vec<u32>) -> Self {
        Self { bands }
    }
}

impl RasterTransform for SelectBands {
    fn name(&self) -> &str {
        "select-bands"
    }

    fn apply(&self, mut params: CoverageParams, _ctx: &TransformContext) -> Result<CoverageParams> {
        if self.bands.is_empty() {
            return Err(ImportError::Transform {
                name: self.name().to_string(),
                reason: "no bands selected".to_string(),
            });
        }
        if let Some(band) = self.bands.iter().find(|b| **b == 0 || **b > params.band_count) {
            return Err(ImportError::Transform {
                name: self.name().to_string(),
                reason: format!("band {} out of range 1..={}", band, params.band_count),
            });
        }
        params.bands = self.bands.clone();
        Ok(params)
    }
}

/// Read from an overview level instead of full resolution
#[derive(Debug, Clone)]
pub struct OverviewLevel {
    level: u32,
}

impl OverviewLevel {
    pub fn new(level: u32) -> Self {
        Self { level }
    }
}

impl RasterTransform for OverviewLevel {
    fn name(&self) -> &str {
        "overview-level"
    }

    fn apply(&self, mut params: CoverageParams, _ctx: &TransformContext) -> Result<CoverageParams> {
        params.overview = self.level;
        Ok(params)
    }
}
