//! Format abstraction layer
//!
//! Each supported format has a `FormatReader` implementation. The
//! `FormatRegistry` keeps the readers in registration order, detects the format
//! of a `SourceUnit` and dispatches inspection and reading to the right reader.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ImportError, Result};
use crate::models::{
    AttributeDescriptor, AttributeKind, BoundingBox, CoverageParams, Crs, DataKind, Feature, GeometryType,
    SourceUnit,
};
use crate::ports::DatabaseConnector;

pub mod csv;
pub mod geojson;
pub mod geotiff;
pub mod prj;
pub mod shapefile;
pub mod table;
pub mod validation;

pub use validation::FormatValidator;

/// Number of bytes read from the primary file when sniffing content
pub const SNIFF_LEN: usize = 4096;

/// Closed set of formats the pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    GeoJson,
    Shapefile,
    Csv,
    GeoTiff,
    Table,
}

impl Format {
    pub const ALL: [Format; 5] =
        [Format::GeoJson, Format::Shapefile, Format::Csv, Format::GeoTiff, Format::Table];

    pub fn name(&self) -> &'static str {
        match self {
            Format::GeoJson => "GeoJSON",
            Format::Shapefile => "Shapefile",
            Format::Csv => "CSV",
            Format::GeoTiff => "GeoTIFF",
            Format::Table => "Table",
        }
    }

    pub fn kind(&self) -> DataKind {
        match self {
            Format::GeoTiff => DataKind::Raster,
            _ => DataKind::Vector,
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Format::GeoJson => &["geojson", "json"],
            Format::Shapefile => &["shp"],
            Format::Csv => &["csv", "tsv"],
            Format::GeoTiff => &["tif", "tiff", "gtif"],
            Format::Table => &[],
        }
    }

    /// Extensions of files that travel with a primary file of this format
    pub fn sidecar_extensions(&self) -> &'static [&'static str] {
        match self {
            Format::Shapefile => &["shx", "dbf", "prj", "cpg", "qix", "sbn", "sbx"],
            Format::GeoTiff => &["tfw", "tifw", "prj", "aux.xml"],
            Format::Csv => &["prj"],
            Format::GeoJson | Format::Table => &[],
        }
    }

    /// How strongly the unit looks like this format
    pub fn confidence(&self, unit: &SourceUnit) -> Confidence {
        match (self, unit) {
            (Format::Table, SourceUnit::Table { .. }) => Confidence::Content,
            (_, SourceUnit::Table { .. }) | (Format::Table, _) => Confidence::None,
            (Format::GeoJson, _) => geojson::confidence(unit),
            (Format::Shapefile, _) => shapefile::confidence(unit),
            (Format::Csv, _) => csv::confidence(unit),
            (Format::GeoTiff, _) => geotiff::confidence(unit),
        }
    }

    /// Match a caller-supplied hint against format names and extensions
    pub fn from_hint(hint: &str) -> Option<Format> {
        let hint = hint.trim().trim_start_matches('.');
        Format::ALL.into_iter().find(|f| {
            f.name().eq_ignore_ascii_case(hint)
                || f.extensions().iter().any(|e| e.eq_ignore_ascii_case(hint))
        })
    }

    pub(crate) fn has_extension(&self, unit: &SourceUnit) -> bool {
        unit.extension()
            .map(|ext| self.extensions().contains(&ext.as_str()))
            .unwrap_or(false)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detection confidence, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    None,
    Extension,
    Content,
}

/// What a reader knows about the extent of a unit without reading it fully
#[derive(Debug, Clone, PartialEq)]
pub enum BoundsHint {
    Known(BoundingBox),
    /// Extent must be computed by scanning the features
    RequiresScan,
    Unavailable,
}

/// Result of inspecting a unit
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    pub kind: DataKind,
    pub crs: Option<Crs>,
    pub bounds: BoundsHint,
    pub attributes: Vec<AttributeDescriptor>,
    pub geometry_type: Option<GeometryType>,
    pub feature_count: Option<usize>,
    pub coverage: Option<CoverageParams>,
}

impl SourceMetadata {
    pub fn vector() -> Self {
        Self {
            kind: DataKind::Vector,
            crs: None,
            bounds: BoundsHint::RequiresScan,
            attributes: Vec::new(),
            geometry_type: None,
            feature_count: None,
            coverage: None,
        }
    }

    pub fn attribute_kind(&self, name: &str) -> Option<AttributeKind> {
        self.attributes.iter().find(|a| a.name == name).map(|a| a.kind)
    }
}

/// Content produced by a full read
#[derive(Debug, Clone, PartialEq)]
pub enum SourceContent {
    Features(Vec<Feature>),
    Coverage(CoverageParams),
}

/// Format reader trait that all format implementations must implement
#[async_trait]
pub trait FormatReader: Send + Sync {
    fn format(&self) -> Format;

    /// Read metadata (CRS, extent, schema) without materializing the content
    async fn inspect(&self, unit: &SourceUnit) -> Result<SourceMetadata>;

    /// Read the full content of the unit
    async fn read(&self, unit: &SourceUnit) -> Result<SourceContent>;

    /// Validate the unit structure without a full read
    async fn validate(&self, _unit: &SourceUnit) -> Result<FormatValidation> {
        Ok(FormatValidation::default())
    }
}

/// Result of format validation
#[derive(Debug, Clone, Default)]
pub struct FormatValidation {
    /// Validation errors that prevent reading
    pub errors: Vec<String>,

    /// Warnings that don't prevent reading but indicate potential issues
    pub warnings: Vec<String>,
}

impl FormatValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Central registry for format readers
pub struct FormatRegistry {
    readers: Vec<Box<dyn FormatReader>>,
}

impl FormatRegistry {
    /// Create a new empty format registry
    pub fn new() -> Self {
        Self { readers: Vec::new() }
    }

    /// Registry with every file format reader
    pub fn with_file_formats() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(geojson::GeoJsonReader));
        registry.register(Box::new(shapefile::ShapefileFormatReader));
        registry.register(Box::new(csv::CsvReader));
        registry.register(Box::new(geotiff::GeoTiffReader));
        registry
    }

    /// Registry with every file format reader plus database tables
    pub fn standard(connector: Arc<dyn DatabaseConnector>) -> Self {
        let mut registry = Self::with_file_formats();
        registry.register(Box::new(table::TableReader::new(connector)));
        registry
    }

    /// Register a format reader; later registrations lose detection ties
    pub fn register(&mut self, reader: Box<dyn FormatReader>) {
        self.readers.push(reader);
    }

    /// Detect the format of a unit
    ///
    /// An explicit hint wins when it names a registered format. Otherwise the
    /// registered format with the highest confidence is chosen, ties going to
    /// the earliest registration.
    pub fn detect(&self, unit: &SourceUnit) -> Option<Format> {
        if let Some(hinted) = unit.format_hint().and_then(Format::from_hint) {
            if self.is_registered(hinted) {
                return Some(hinted);
            }
        }

        let mut best: Option<(Format, Confidence)> = None;
        for reader in &self.readers {
            let format = reader.format();
            let confidence = format.confidence(unit);
            if confidence == Confidence::None {
                continue;
            }
            match best {
                Some((_, current)) if current >= confidence => {}
                _ => best = Some((format, confidence)),
            }
        }
        best.map(|(format, _)| format)
    }

    /// Reader registered for a format
    pub fn reader(&self, format: Format) -> Result<&dyn FormatReader> {
        self.readers
            .iter()
            .find(|r| r.format() == format)
            .map(|r| r.as_ref())
            .ok_or_else(|| ImportError::ReaderMissing { format: format.name().to_string() })
    }

    pub fn is_registered(&self, format: Format) -> bool {
        self.readers.iter().any(|r| r.format() == format)
    }

    /// Registered formats in registration order
    pub fn formats(&self) -> Vec<Format> {
        self.readers.iter().map(|r| r.format()).collect()
    }

    /// Get list of all supported primary file extensions
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        self.readers.iter().flat_map(|r| r.format().extensions().iter().copied()).collect()
    }

    /// Sidecar extensions of every registered format
    pub fn sidecar_extensions(&self) -> Vec<&'static str> {
        let mut all: Vec<&'static str> = Vec::new();
        for ext in self.readers.iter().flat_map(|r| r.format().sidecar_extensions().iter()) {
            if !all.contains(ext) {
                all.push(ext);
            }
        }
        all
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_file_formats()
    }
}

/// Read up to `len` bytes from the start of a file
pub(crate) fn read_prefix(path: &Path, len: usize) -> Option<Vec<u8>> {
    let file = std::fs::File::open(path).ok()?;
    let mut buf = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut buf).ok()?;
    Some(buf)
}

/// Resolve the CRS declared in a unit's `.prj` sidecar, if any
pub(crate) fn prj_crs(unit: &SourceUnit) -> Option<Crs> {
    let path = unit.sidecar("prj")?;
    let content = std::fs::read_to_string(&path).ok()?;
    prj::crs_from_wkt(&content)
}
