//! Delimited text reader
//!
//! Geometry comes from a pair of longitude/latitude columns or from a WKT
//! column, detected by header name. A file with neither yields features
//! without geometry, which a `CoordinatesToPoint` transform can fill in.
//! The CRS is only known when a `.prj` sidecar is present.

use async_trait::async_trait;
use std::path::Path;
use std::str::FromStr;

use crate::error::{ImportError, Result};
use crate::formats::validation::FormatValidator;
use crate::formats::{
    prj_crs, read_prefix, BoundsHint, Confidence, Format, FormatReader, FormatValidation,
    SourceContent, SourceMetadata, SNIFF_LEN,
};
use crate::models::{
    AttributeDescriptor, AttributeKind, DataKind, Feature, Geometry, GeometryType, SourceUnit,
};

const X_COLUMNS: &[&str] = &["lon", "lng", "long", "longitude", "x"];
const Y_COLUMNS: &[&str] = &["lat", "latitude", "y"];
const WKT_COLUMNS: &[&str] = &["wkt", "geom", "geometry", "the_geom"];

/// CSV/TSV format reader
pub struct CsvReader;

pub(crate) fn confidence(unit: &SourceUnit) -> Confidence {
    if !Format::Csv.has_extension(unit) {
        return Confidence::None;
    }
    let header_columns = unit
        .primary_path()
        .and_then(|p| read_prefix(p, SNIFF_LEN))
        .map(|prefix| {
            let text = String::from_utf8_lossy(&prefix);
            let first_line = text.lines().next().unwrap_or_default().to_string();
            let delimiter = delimiter_for(unit, &first_line);
            first_line.split(delimiter as char).filter(|c| !c.trim().is_empty()).count()
        })
        .unwrap_or(0);

    if header_columns >= 2 {
        Confidence::Content
    } else {
        Confidence::Extension
    }
}

/// Tab for `.tsv`, semicolon when the header has no comma, comma otherwise
fn delimiter_for(unit: &SourceUnit, header_line: &str) -> u8 {
    if unit.extension().as_deref() == Some("tsv") {
        b'\t'
    } else if !header_line.contains(',') && header_line.contains(';') {
        b';'
    } else {
        b','
    }
}

/// Where the geometry of a row comes from
#[derive(Debug, Clone, PartialEq)]
enum GeometrySource {
    Coordinates { x: usize, y: usize },
    Wkt(usize),
    None,
}

impl GeometrySource {
    fn detect(headers: &[String]) -> Self {
        let find = |names: &[&str]| {
            headers.iter().position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        if let (Some(x), Some(y)) = (find(X_COLUMNS), find(Y_COLUMNS)) {
            return GeometrySource::Coordinates { x, y };
        }
        match find(WKT_COLUMNS) {
            Some(idx) => GeometrySource::Wkt(idx),
            None => GeometrySource::None,
        }
    }

    fn consumes(&self, idx: usize) -> bool {
        match self {
            GeometrySource::Coordinates { x, y } => idx == *x || idx == *y,
            GeometrySource::Wkt(col) => idx == *col,
            GeometrySource::None => false,
        }
    }

    fn geometry(&self, row: &csv::StringRecord) -> Option<Geometry> {
        match self {
            GeometrySource::Coordinates { x, y } => {
                let x: f64 = row.get(*x)?.trim().parse().ok()?;
                let y: f64 = row.get(*y)?.trim().parse().ok()?;
                (x.is_finite() && y.is_finite()).then(|| Geometry::point(x, y))
            }
            GeometrySource::Wkt(col) => parse_wkt(row.get(*col)?),
            GeometrySource::None => None,
        }
    }
}

struct Table {
    headers: Vec<String>,
    rows: Vec<csv::StringRecord>,
    geometry: GeometrySource,
}

fn load(unit: &SourceUnit) -> Result<Table> {
    let path = primary(unit)?;
    let header_line = read_prefix(path, SNIFF_LEN)
        .map(|p| String::from_utf8_lossy(&p).lines().next().unwrap_or_default().to_string())
        .unwrap_or_default();

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_for(unit, &header_line))
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>().map_err(csv_error)?;
    let geometry = GeometrySource::detect(&headers);

    Ok(Table { headers, rows, geometry })
}

fn primary(unit: &SourceUnit) -> Result<&Path> {
    unit.primary_path().ok_or_else(|| ImportError::FormatError {
        format: Format::Csv.name().to_string(),
        message: "CSV can only be read from files".to_string(),
    })
}

fn csv_error(e: csv::Error) -> ImportError {
    ImportError::FormatError { format: Format::Csv.name().to_string(), message: e.to_string() }
}

/// Kind of a raw cell value; empty cells have none
fn cell_kind(value: &str) -> Option<AttributeKind> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else if value.parse::<i64>().is_ok() {
        Some(AttributeKind::Integer)
    } else if value.parse::<f64>().is_ok() {
        Some(AttributeKind::Float)
    } else if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
        Some(AttributeKind::Boolean)
    } else {
        Some(AttributeKind::String)
    }
}

/// Widen two observed kinds to one that holds both
fn widen(a: AttributeKind, b: AttributeKind) -> AttributeKind {
    match (a, b) {
        (a, b) if a == b => a,
        (AttributeKind::Integer, AttributeKind::Float) | (AttributeKind::Float, AttributeKind::Integer) => {
            AttributeKind::Float
        }
        _ => AttributeKind::String,
    }
}

fn typed_value(raw: &str, kind: AttributeKind) -> serde_json::Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return serde_json::Value::Null;
    }
    match kind {
        AttributeKind::Integer => raw.parse::<i64>().map(Into::into).unwrap_or(serde_json::Value::Null),
        AttributeKind::Float => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        AttributeKind::Boolean => serde_json::Value::Bool(raw.eq_ignore_ascii_case("true")),
        AttributeKind::String | AttributeKind::Date => serde_json::Value::String(raw.to_string()),
    }
}

impl Table {
    fn attributes(&self) -> Vec<AttributeDescriptor> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| !self.geometry.consumes(*idx))
            .map(|(idx, name)| {
                let kind = self
                    .rows
                    .iter()
                    .filter_map(|row| row.get(idx).and_then(cell_kind))
                    .reduce(widen)
                    .unwrap_or_default();
                AttributeDescriptor::new(name.clone(), kind)
            })
            .collect()
    }

    fn features(&self) -> Vec<Feature> {
        let attributes = self.attributes();
        self.rows
            .iter()
            .enumerate()
            .map(|(row_idx, row)| {
                let mut feature = Feature::new(self.geometry.geometry(row)).with_id(row_idx.to_string());
                let mut attrs = attributes.iter();
                for (idx, raw) in row.iter().enumerate() {
                    if self.geometry.consumes(idx) || idx >= self.headers.len() {
                        continue;
                    }
                    if let Some(attr) = attrs.next() {
                        feature.properties.insert(attr.name.clone(), typed_value(raw, attr.kind));
                    }
                }
                feature
            })
            .collect()
    }
}

fn parse_wkt(text: &str) -> Option<Geometry> {
    let parsed = wkt::Wkt::<f64>::from_str(text.trim()).ok()?;
    let geometry: geojson::Geometry = geojson::Geometry::new(wkt_to_geojson(&parsed)?);
    Geometry::from_geojson(&serde_json::to_value(&geometry).ok()?)
}

fn coord(c: &wkt::types::Coord<f64>) -> Vec<f64> {
    vec![c.x, c.y]
}

fn line(l: &wkt::types::LineString<f64>) -> Vec<Vec<f64>> {
    l.0.iter().map(coord).collect()
}

fn polygon(p: &wkt::types::Polygon<f64>) -> Vec<Vec<Vec<f64>>> {
    p.0.iter().map(line).collect()
}

fn wkt_to_geojson(parsed: &wkt::Wkt<f64>) -> Option<geojson::Value> {
    Some(match parsed {
        wkt::Wkt::Point(p) => geojson::Value::Point(coord(p.0.as_ref()?)),
        wkt::Wkt::LineString(l) => geojson::Value::LineString(line(l)),
        wkt::Wkt::Polygon(p) => geojson::Value::Polygon(polygon(p)),
        wkt::Wkt::MultiPoint(m) => {
            geojson::Value::MultiPoint(m.0.iter().filter_map(|p| p.0.as_ref().map(coord)).collect())
        }
        wkt::Wkt::MultiLineString(m) => geojson::Value::MultiLineString(m.0.iter().map(line).collect()),
        wkt::Wkt::MultiPolygon(m) => geojson::Value::MultiPolygon(m.0.iter().map(polygon).collect()),
        wkt::Wkt::GeometryCollection(_) => return None,
    })
}

#[async_trait]
impl FormatReader for CsvReader {
    fn format(&self) -> Format {
        Format::Csv
    }

    async fn inspect(&self, unit: &SourceUnit) -> Result<SourceMetadata> {
        let table = load(unit)?;
        let geometry_type = match table.geometry {
            GeometrySource::Coordinates { .. } => Some(GeometryType::Point),
            GeometrySource::Wkt(_) => table
                .rows
                .iter()
                .filter_map(|row| table.geometry.geometry(row))
                .map(|g| g.geometry_type())
                .reduce(GeometryType::combine),
            GeometrySource::None => None,
        };

        Ok(SourceMetadata {
            kind: DataKind::Vector,
            crs: prj_crs(unit),
            bounds: BoundsHint::RequiresScan,
            attributes: table.attributes(),
            geometry_type,
            feature_count: Some(table.rows.len()),
            coverage: None,
        })
    }

    async fn read(&self, unit: &SourceUnit) -> Result<SourceContent> {
        Ok(SourceContent::Features(load(unit)?.features()))
    }

    async fn validate(&self, unit: &SourceUnit) -> Result<FormatValidation> {
        let path = primary(unit)?;
        let validation = FormatValidator::validate_file_exists(path);
        if !validation.is_valid() {
            return Ok(validation);
        }

        let mut utf8 = FormatValidator::validate_utf8(path);
        if utf8.is_valid() && unit.sidecar("prj").is_none() {
            utf8.warnings.push("No .prj file; the coordinate system must be supplied".to_string());
        }
        Ok(FormatValidator::merge_validations(vec![validation, utf8]))
    }
}
