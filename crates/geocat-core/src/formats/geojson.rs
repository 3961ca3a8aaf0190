//! GeoJSON format reader implementation

use async_trait::async_trait;
use std::fs;
use std::path::Path;

use crate::error::{ImportError, Result};
use crate::formats::validation::FormatValidator;
use crate::formats::{
    read_prefix, BoundsHint, Confidence, Format, FormatReader, FormatValidation, SourceContent,
    SourceMetadata, SNIFF_LEN,
};
use crate::models::{
    AttributeDescriptor, AttributeKind, BoundingBox, Crs, DataKind, Feature, Geometry,
    GeometryType, SourceUnit,
};

/// GeoJSON format reader
pub struct GeoJsonReader;

pub(crate) fn confidence(unit: &SourceUnit) -> Confidence {
    let by_extension = Format::GeoJson.has_extension(unit);
    let looks_like_json = unit
        .primary_path()
        .and_then(|p| read_prefix(p, SNIFF_LEN))
        .map(|prefix| {
            let text = String::from_utf8_lossy(&prefix);
            text.trim_start().starts_with('{') && text.contains("\"type\"")
        })
        .unwrap_or(false);

    if looks_like_json {
        Confidence::Content
    } else if by_extension {
        Confidence::Extension
    } else {
        Confidence::None
    }
}

#[async_trait]
impl FormatReader for GeoJsonReader {
    fn format(&self) -> Format {
        Format::GeoJson
    }

    async fn inspect(&self, unit: &SourceUnit) -> Result<SourceMetadata> {
        let path = primary(unit)?;
        let geojson = parse(path)?;
        let features = extract_features(&geojson);

        let mut geometry_type: Option<GeometryType> = None;
        for geometry in features.iter().filter_map(|f| f.geometry.as_ref()) {
            let observed = geometry.geometry_type();
            geometry_type = Some(geometry_type.map_or(observed, |t| t.combine(observed)));
        }

        let crs = extract_crs(&geojson);
        let bounds = match declared_bbox(&geojson) {
            Some(bbox) => BoundsHint::Known(bbox.with_crs(crs.clone())),
            None => BoundsHint::RequiresScan,
        };

        Ok(SourceMetadata {
            kind: DataKind::Vector,
            crs,
            bounds,
            attributes: collect_attributes(&features),
            geometry_type,
            feature_count: Some(features.len()),
            coverage: None,
        })
    }

    async fn read(&self, unit: &SourceUnit) -> Result<SourceContent> {
        let path = primary(unit)?;
        let geojson = parse(path)?;
        Ok(SourceContent::Features(extract_features(&geojson)))
    }

    async fn validate(&self, unit: &SourceUnit) -> Result<FormatValidation> {
        let path = primary(unit)?;
        let validation = FormatValidator::validate_file_exists(path);
        if !validation.is_valid() {
            return Ok(validation);
        }

        let json_validation = FormatValidator::validate_json_structure(path);
        Ok(FormatValidator::merge_validations(vec![validation, json_validation]))
    }
}

fn primary(unit: &SourceUnit) -> Result<&Path> {
    unit.primary_path().ok_or_else(|| ImportError::FormatError {
        format: Format::GeoJson.name().to_string(),
        message: "GeoJSON can only be read from files".to_string(),
    })
}

fn parse(path: &Path) -> Result<geojson::GeoJson> {
    let content = fs::read_to_string(path)?;
    content.parse::<geojson::GeoJson>().map_err(|e| ImportError::FormatError {
        format: Format::GeoJson.name().to_string(),
        message: format!("Failed to parse GeoJSON: {}", e),
    })
}

fn extract_features(geojson: &geojson::GeoJson) -> Vec<Feature> {
    match geojson {
        geojson::GeoJson::FeatureCollection(fc) => fc
            .features
            .iter()
            .enumerate()
            .map(|(idx, feature)| convert_feature(feature, idx))
            .collect(),
        geojson::GeoJson::Feature(feature) => vec![convert_feature(feature, 0)],
        geojson::GeoJson::Geometry(geom) => {
            vec![Feature::new(convert_geometry(&geom.value)).with_id("0")]
        }
    }
}

fn convert_feature(feature: &geojson::Feature, idx: usize) -> Feature {
    let id = feature
        .id
        .as_ref()
        .map(|id| match id {
            geojson::feature::Id::String(s) => s.clone(),
            geojson::feature::Id::Number(n) => n.to_string(),
        })
        .unwrap_or_else(|| idx.to_string());

    Feature {
        id: Some(id),
        geometry: feature.geometry.as_ref().and_then(|g| convert_geometry(&g.value)),
        properties: feature.properties.clone().unwrap_or_default(),
    }
}

fn position(p: &[f64]) -> Option<[f64; 2]> {
    match p {
        [x, y, ..] => Some([*x, *y]),
        _ => None,
    }
}

fn line(points: &[Vec<f64>]) -> Vec<[f64; 2]> {
    points.iter().filter_map(|p| position(p)).collect()
}

fn rings(lines: &[Vec<Vec<f64>>]) -> Vec<Vec<[f64; 2]>> {
    lines.iter().map(|l| line(l)).collect()
}

/// Convert a GeoJSON geometry value, dropping extra ordinates
///
/// Geometry collections have no counterpart and yield `None`.
fn convert_geometry(value: &geojson::Value) -> Option<Geometry> {
    match value {
        geojson::Value::Point(p) => position(p).map(|coordinates| Geometry::Point { coordinates }),
        geojson::Value::MultiPoint(points) => Some(Geometry::MultiPoint { coordinates: line(points) }),
        geojson::Value::LineString(points) => Some(Geometry::LineString { coordinates: line(points) }),
        geojson::Value::MultiLineString(lines) => {
            Some(Geometry::MultiLineString { coordinates: rings(lines) })
        }
        geojson::Value::Polygon(polygon) => Some(Geometry::Polygon { coordinates: rings(polygon) }),
        geojson::Value::MultiPolygon(polygons) => Some(Geometry::MultiPolygon {
            coordinates: polygons.iter().map(|p| rings(p)).collect(),
        }),
        geojson::Value::GeometryCollection(_) => None,
    }
}

/// Legacy `crs` member, RFC 7946 WGS 84 otherwise
fn extract_crs(geojson: &geojson::GeoJson) -> Option<Crs> {
    let foreign = match geojson {
        geojson::GeoJson::FeatureCollection(fc) => fc.foreign_members.as_ref(),
        geojson::GeoJson::Feature(f) => f.foreign_members.as_ref(),
        geojson::GeoJson::Geometry(g) => g.foreign_members.as_ref(),
    };

    match foreign.and_then(|fm| fm.get("crs")) {
        Some(crs_obj) => extract_crs_name(crs_obj).and_then(|name| Crs::parse(&name).ok()),
        None => Some(Crs::wgs84()),
    }
}

/// Name of a legacy CRS object, e.g. `urn:ogc:def:crs:EPSG::4326`
fn extract_crs_name(crs: &serde_json::Value) -> Option<String> {
    crs.get("properties")
        .and_then(|props| props.get("name"))
        .and_then(|name| name.as_str())
        .map(|s| s.to_string())
}

fn declared_bbox(geojson: &geojson::GeoJson) -> Option<BoundingBox> {
    let bbox = match geojson {
        geojson::GeoJson::FeatureCollection(fc) => fc.bbox.as_ref(),
        geojson::GeoJson::Feature(f) => f.bbox.as_ref(),
        geojson::GeoJson::Geometry(g) => g.bbox.as_ref(),
    }?;

    let bbox = match bbox.as_slice() {
        [min_x, min_y, max_x, max_y] => BoundingBox::new(*min_x, *min_y, *max_x, *max_y, None),
        [min_x, min_y, _, max_x, max_y, _] => {
            BoundingBox::new(*min_x, *min_y, *max_x, *max_y, None)
        }
        _ => return None,
    };
    bbox.is_valid().then_some(bbox)
}

/// Union of property names in first-seen order, typed by the first non-null value
pub(crate) fn collect_attributes(features: &[Feature]) -> Vec<AttributeDescriptor> {
    let mut attributes: Vec<(AttributeDescriptor, bool)> = Vec::new();
    for feature in features {
        for (name, value) in &feature.properties {
            let kind = AttributeKind::of_value(value);
            match attributes.iter_mut().find(|(a, _)| &a.name == name) {
                Some((existing, typed)) => match kind {
                    Some(kind) if !*typed => {
                        existing.kind = kind;
                        *typed = true;
                    }
                    Some(AttributeKind::Float) if existing.kind == AttributeKind::Integer => {
                        existing.kind = AttributeKind::Float;
                    }
                    _ => {}
                },
                None => attributes.push((
                    AttributeDescriptor::new(name.clone(), kind.unwrap_or_default()),
                    kind.is_some(),
                )),
            }
        }
    }
    attributes.into_iter().map(|(a, _)| a).collect()
}
