//! Shapefile format reader implementation
//!
//! A shapefile is a group of files (.shp, .shx, .dbf and an optional .prj)
//! that must travel together. The 100-byte `.shp` header already carries the
//! shape type and extent, so inspection never touches the records.

use async_trait::async_trait;
use shapefile::dbase::{FieldType, FieldValue};
use shapefile::{PolygonRing, Shape};
use std::path::Path;

use crate::error::{ImportError, Result};
use crate::formats::validation::FormatValidator;
use crate::formats::{
    prj_crs, read_prefix, BoundsHint, Confidence, Format, FormatReader, FormatValidation,
    SourceContent, SourceMetadata,
};
use crate::models::{
    AttributeDescriptor, AttributeKind, BoundingBox, DataKind, Feature, Geometry, GeometryType,
    SourceUnit,
};

/// Big-endian file code at the start of every `.shp` and `.shx`
pub const SHAPEFILE_MAGIC: u32 = 0x0000_270A;

const HEADER_LEN: usize = 100;

/// Shapefile format reader
pub struct ShapefileFormatReader;

pub(crate) fn confidence(unit: &SourceUnit) -> Confidence {
    if !Format::Shapefile.has_extension(unit) {
        return Confidence::None;
    }
    if unit.sidecar("shx").is_none() || unit.sidecar("dbf").is_none() {
        return Confidence::None;
    }
    match unit.primary_path().and_then(|p| read_prefix(p, HEADER_LEN)) {
        Some(header) if header.len() >= 4 && header[..4] == SHAPEFILE_MAGIC.to_be_bytes() => {
            Confidence::Content
        }
        _ => Confidence::Extension,
    }
}

/// Parsed `.shp` main file header
#[derive(Debug, Clone, PartialEq)]
pub struct ShpHeader {
    pub shape_type: i32,
    pub bbox: BoundingBox,
}

impl ShpHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || bytes[..4] != SHAPEFILE_MAGIC.to_be_bytes() {
            return Err(ImportError::FormatError {
                format: Format::Shapefile.name().to_string(),
                message: "Not a shapefile main file header".to_string(),
            });
        }

        let le_f64 = |offset: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[offset..offset + 8]);
            f64::from_le_bytes(buf)
        };
        let mut shape_type = [0u8; 4];
        shape_type.copy_from_slice(&bytes[32..36]);

        Ok(Self {
            shape_type: i32::from_le_bytes(shape_type),
            bbox: BoundingBox::new(le_f64(36), le_f64(44), le_f64(52), le_f64(60), None),
        })
    }

    pub fn geometry_type(&self) -> Option<GeometryType> {
        match self.shape_type {
            1 | 11 | 21 => Some(GeometryType::Point),
            3 | 13 | 23 => Some(GeometryType::MultiLineString),
            5 | 15 | 25 => Some(GeometryType::MultiPolygon),
            8 | 18 | 28 => Some(GeometryType::MultiPoint),
            _ => None,
        }
    }
}

#[async_trait]
impl FormatReader for ShapefileFormatReader {
    fn format(&self) -> Format {
        Format::Shapefile
    }

    async fn inspect(&self, unit: &SourceUnit) -> Result<SourceMetadata> {
        let path = primary(unit)?;
        let header_bytes = read_prefix(path, HEADER_LEN).unwrap_or_default();
        let header = ShpHeader::parse(&header_bytes)?;

        let feature_count = unit
            .sidecar("shx")
            .and_then(|shx| std::fs::metadata(shx).ok())
            .map(|m| (m.len() as usize).saturating_sub(HEADER_LEN) / 8);

        let crs = prj_crs(unit);
        let bounds = match feature_count {
            Some(count) if count > 0 && header.bbox.is_valid() => {
                BoundsHint::Known(header.bbox.clone().with_crs(crs.clone()))
            }
            _ => BoundsHint::RequiresScan,
        };

        Ok(SourceMetadata {
            kind: DataKind::Vector,
            crs,
            bounds,
            attributes: read_attributes(unit)?,
            geometry_type: header.geometry_type(),
            feature_count,
            coverage: None,
        })
    }

    async fn read(&self, unit: &SourceUnit) -> Result<SourceContent> {
        let path = primary(unit)?;
        let mut reader = shapefile::Reader::from_path(path).map_err(|e| format_error(format!(
            "Failed to open Shapefile: {}",
            e
        )))?;

        let mut features = Vec::new();
        for (idx, result) in reader.iter_shapes_and_records().enumerate() {
            let (shape, record) =
                result.map_err(|e| format_error(format!("Failed to read feature {}: {}", idx, e)))?;

            let mut feature = Feature::new(convert_shape(&shape)?).with_id(idx.to_string());
            for (name, value) in record {
                feature.properties.insert(name, convert_dbase_value(&value));
            }
            features.push(feature);
        }

        Ok(SourceContent::Features(features))
    }

    async fn validate(&self, unit: &SourceUnit) -> Result<FormatValidation> {
        let path = primary(unit)?;
        let validation = FormatValidator::validate_file_exists(path);
        if !validation.is_valid() {
            return Ok(validation);
        }

        let components = FormatValidator::validate_component_files(path, &["shx", "dbf"], &["prj"]);
        Ok(FormatValidator::merge_validations(vec![validation, components]))
    }
}

fn primary(unit: &SourceUnit) -> Result<&Path> {
    unit.primary_path()
        .ok_or_else(|| format_error("Shapefiles can only be read from files".to_string()))
}

fn format_error(message: String) -> ImportError {
    ImportError::FormatError { format: Format::Shapefile.name().to_string(), message }
}

/// Attribute schema from the `.dbf` field descriptors
fn read_attributes(unit: &SourceUnit) -> Result<Vec<AttributeDescriptor>> {
    let Some(dbf) = unit.sidecar("dbf") else {
        return Ok(Vec::new());
    };
    let reader = shapefile::dbase::Reader::from_path(&dbf)
        .map_err(|e| format_error(format!("Failed to open {}: {}", dbf.display(), e)))?;

    Ok(reader
        .fields()
        .iter()
        .filter(|field| field.name() != "DeletionFlag")
        .map(|field| {
            let kind = match field.field_type() {
                FieldType::Integer => AttributeKind::Integer,
                FieldType::Numeric | FieldType::Float | FieldType::Double | FieldType::Currency => {
                    AttributeKind::Float
                }
                FieldType::Logical => AttributeKind::Boolean,
                FieldType::Date | FieldType::DateTime => AttributeKind::Date,
                _ => AttributeKind::String,
            };
            AttributeDescriptor::new(field.name(), kind)
        })
        .collect())
}

macro_rules! xy {
    ($points:expr) => {
        $points.iter().map(|p| [p.x, p.y]).collect::<Vec<[f64; 2]>>()
    };
}

fn lines(parts: Vec<Vec<[f64; 2]>>) -> Geometry {
    if parts.len() == 1 {
        Geometry::LineString { coordinates: parts.into_iter().flatten().collect() }
    } else {
        Geometry::MultiLineString { coordinates: parts }
    }
}

/// Outer rings open a new polygon, inner rings attach to the last one
fn polygons(rings: Vec<(bool, Vec<[f64; 2]>)>) -> Geometry {
    let mut polygons: Vec<Vec<Vec<[f64; 2]>>> = Vec::new();
    for (outer, ring) in rings {
        match polygons.last_mut() {
            Some(polygon) if !outer => polygon.push(ring),
            _ => polygons.push(vec![ring]),
        }
    }
    if polygons.len() == 1 {
        Geometry::Polygon { coordinates: polygons.remove(0) }
    } else {
        Geometry::MultiPolygon { coordinates: polygons }
    }
}

macro_rules! rings {
    ($polygon:expr) => {
        $polygon
            .rings()
            .iter()
            .map(|ring| (matches!(ring, PolygonRing::Outer(_)), xy!(ring.points())))
            .collect::<Vec<_>>()
    };
}

/// Convert a shape to a 2D geometry; null shapes have no geometry
fn convert_shape(shape: &Shape) -> Result<Option<Geometry>> {
    let geometry = match shape {
        Shape::NullShape => return Ok(None),
        Shape::Point(p) => Geometry::point(p.x, p.y),
        Shape::PointM(p) => Geometry::point(p.x, p.y),
        Shape::PointZ(p) => Geometry::point(p.x, p.y),
        Shape::Polyline(l) => lines(l.parts().iter().map(|part| xy!(part)).collect()),
        Shape::PolylineM(l) => lines(l.parts().iter().map(|part| xy!(part)).collect()),
        Shape::PolylineZ(l) => lines(l.parts().iter().map(|part| xy!(part)).collect()),
        Shape::Polygon(p) => polygons(rings!(p)),
        Shape::PolygonM(p) => polygons(rings!(p)),
        Shape::PolygonZ(p) => polygons(rings!(p)),
        Shape::Multipoint(m) => Geometry::MultiPoint { coordinates: xy!(m.points()) },
        Shape::MultipointM(m) => Geometry::MultiPoint { coordinates: xy!(m.points()) },
        Shape::MultipointZ(m) => Geometry::MultiPoint { coordinates: xy!(m.points()) },
        Shape::Multipatch(_) => {
            return Err(format_error("Multipatch geometry type is not supported".to_string()))
        }
    };
    Ok(Some(geometry))
}

fn number(value: f64) -> serde_json::Value {
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn convert_dbase_value(value: &FieldValue) -> serde_json::Value {
    use serde_json::Value;
    match value {
        FieldValue::Character(Some(s)) => Value::String(s.trim_end().to_string()),
        FieldValue::Numeric(Some(n)) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
            Value::Number((*n as i64).into())
        }
        FieldValue::Numeric(Some(n)) => number(*n),
        FieldValue::Logical(Some(b)) => Value::Bool(*b),
        FieldValue::Date(Some(date)) => {
            Value::String(format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day()))
        }
        FieldValue::Float(Some(f)) => number(*f as f64),
        FieldValue::Integer(i) => Value::Number((*i).into()),
        FieldValue::Currency(c) | FieldValue::Double(c) => number(*c),
        FieldValue::DateTime(dt) => Value::String(format!(
            "{:04}-{:02}-{:02}",
            dt.date().year(),
            dt.date().month(),
            dt.date().day()
        )),
        FieldValue::Memo(s) => Value::String(s.clone()),
        _ => Value::Null,
    }
}
