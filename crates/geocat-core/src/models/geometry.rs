//! Canonical geometry, CRS and bounding box types used across all geocat crates.
//!
//! `Geometry` maps directly onto GeoJSON geometry objects so features can be
//! written to JSON-backed stores without conversion; `geocat-geo` bridges it
//! to the computational `geo` crate types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ImportError, Result};

/// Coordinate Reference System identified by EPSG code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crs {
    pub epsg: u32,
    pub name: String,
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.epsg == other.epsg
    }
}

impl Eq for Crs {}

impl Crs {
    pub fn new(epsg: u32, name: impl Into<String>) -> Self {
        Self { epsg, name: name.into() }
    }

    /// Build a CRS from an EPSG code, naming the well-known ones
    pub fn from_epsg(epsg: u32) -> Self {
        match epsg {
            4326 => Self::wgs84(),
            3857 => Self::web_mercator(),
            4269 => Self::new(4269, "NAD83"),
            4258 => Self::new(4258, "ETRS89"),
            26713 => Self::new(26713, "NAD27 / UTM zone 13N"),
            32601..=32660 => Self::new(epsg, format!("WGS 84 / UTM zone {}N", epsg - 32600)),
            32701..=32760 => Self::new(epsg, format!("WGS 84 / UTM zone {}S", epsg - 32700)),
            _ => Self::new(epsg, format!("EPSG:{}", epsg)),
        }
    }

    /// WGS 84 (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::new(4326, "WGS 84")
    }

    /// Web Mercator (EPSG:3857)
    pub fn web_mercator() -> Self {
        Self::new(3857, "WGS 84 / Pseudo-Mercator")
    }

    /// Parse an SRS code such as `EPSG:4326`, `4326`, `urn:ogc:def:crs:EPSG::4326`
    /// or `CRS:84`.
    pub fn parse(code: &str) -> Result<Self> {
        let trimmed = code.trim();
        let upper = trimmed.to_ascii_uppercase();

        if upper == "CRS:84" || upper.ends_with("CRS84") {
            return Ok(Self::wgs84());
        }

        let digits = upper
            .rsplit(':')
            .next()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
            .ok_or_else(|| ImportError::UnknownCrs { code: trimmed.to_string() })?;

        let is_epsg = upper.starts_with("EPSG:")
            || upper.contains(":EPSG:")
            || upper.chars().all(|c| c.is_ascii_digit());
        if !is_epsg {
            return Err(ImportError::UnknownCrs { code: trimmed.to_string() });
        }

        let epsg: u32 = digits
            .parse()
            .map_err(|_| ImportError::UnknownCrs { code: trimmed.to_string() })?;

        // Legacy Google code
        if epsg == 900913 {
            return Ok(Self::web_mercator());
        }

        Ok(Self::from_epsg(epsg))
    }

    /// Canonical `EPSG:n` form
    pub fn code(&self) -> String {
        format!("EPSG:{}", self.epsg)
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{} ({})", self.epsg, self.name)
    }
}

/// Axis-aligned bounding box with an optional CRS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub crs: Option<Crs>,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, crs: Option<Crs>) -> Self {
        Self { min_x, min_y, max_x, max_y, crs }
    }

    /// Bounding box of the whole world in WGS 84
    pub fn world() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0, Some(Crs::wgs84()))
    }

    /// Return the same extent tagged with another CRS
    pub fn with_crs(mut self, crs: Option<Crs>) -> Self {
        self.crs = crs;
        self
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True when every ordinate is finite and min <= max on both axes
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y].iter().all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Grow this box to include another one (CRS of `self` is kept)
    pub fn expand(&mut self, other: &BoundingBox) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// Union of two optional boxes
    pub fn merge(a: Option<BoundingBox>, b: Option<BoundingBox>) -> Option<BoundingBox> {
        match (a, b) {
            (Some(mut a), Some(b)) => {
                a.expand(&b);
                Some(a)
            }
            (a, None) => a,
            (None, b) => b,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.min_x, self.min_y, self.max_x, self.max_y)?;
        if let Some(crs) = &self.crs {
            write!(f, " {}", crs.code())?;
        }
        Ok(())
    }
}

/// Geometry type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GeometryType {
    #[default]
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    Mixed,
}

impl GeometryType {
    /// Combine two observed types into the type describing both
    pub fn combine(self, other: GeometryType) -> GeometryType {
        if self == other {
            return self;
        }
        match (self, other) {
            (GeometryType::Point, GeometryType::MultiPoint)
            | (GeometryType::MultiPoint, GeometryType::Point) => GeometryType::MultiPoint,
            (GeometryType::LineString, GeometryType::MultiLineString)
            | (GeometryType::MultiLineString, GeometryType::LineString) => {
                GeometryType::MultiLineString
            }
            (GeometryType::Polygon, GeometryType::MultiPolygon)
            | (GeometryType::MultiPolygon, GeometryType::Polygon) => GeometryType::MultiPolygon,
            _ => GeometryType::Mixed,
        }
    }
}

/// GeoJSON-compatible geometry representation
///
/// Only two dimensions are carried; readers drop Z and M ordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: [f64; 2],
    },
    LineString {
        coordinates: Vec<[f64; 2]>,
    },
    Polygon {
        coordinates: Vec<Vec<[f64; 2]>>,
    },
    MultiPoint {
        coordinates: Vec<[f64; 2]>,
    },
    MultiLineString {
        coordinates: Vec<Vec<[f64; 2]>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<[f64; 2]>>>,
    },
}

impl Geometry {
    /// Create a Point geometry
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point { coordinates: [x, y] }
    }

    /// Create a LineString geometry
    pub fn line_string(coords: Vec<[f64; 2]>) -> Self {
        Geometry::LineString { coordinates: coords }
    }

    /// Create a Polygon geometry
    pub fn polygon(rings: Vec<Vec<[f64; 2]>>) -> Self {
        Geometry::Polygon { coordinates: rings }
    }

    /// Get the geometry type
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point { .. } => GeometryType::Point,
            Geometry::LineString { .. } => GeometryType::LineString,
            Geometry::Polygon { .. } => GeometryType::Polygon,
            Geometry::MultiPoint { .. } => GeometryType::MultiPoint,
            Geometry::MultiLineString { .. } => GeometryType::MultiLineString,
            Geometry::MultiPolygon { .. } => GeometryType::MultiPolygon,
        }
    }

    /// True when the geometry carries no coordinates at all
    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Point { .. } => false,
            Geometry::LineString { coordinates } | Geometry::MultiPoint { coordinates } => {
                coordinates.is_empty()
            }
            Geometry::Polygon { coordinates } | Geometry::MultiLineString { coordinates } => {
                coordinates.iter().all(|ring| ring.is_empty())
            }
            Geometry::MultiPolygon { coordinates } => {
                coordinates.iter().flatten().all(|ring| ring.is_empty())
            }
        }
    }

    /// Try to parse from a serde_json::Value (GeoJSON)
    pub fn from_geojson(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_serialization() {
        let point = Geometry::point(115.0, -8.5);
        let json = serde_json::to_string(&point).unwrap();
        assert!(json.contains("Point"));

        let parsed: Geometry = serde_json::from_str(&json).unwrap();
        assert_eq!(point, parsed);
    }

    #[test]
    fn test_crs_parse_variants() {
        assert_eq!(Crs::parse("EPSG:4326").unwrap().epsg, 4326);
        assert_eq!(Crs::parse("epsg:3857").unwrap().epsg, 3857);
        assert_eq!(Crs::parse("26713").unwrap().epsg, 26713);
        assert_eq!(Crs::parse("urn:ogc:def:crs:EPSG::32633").unwrap().epsg, 32633);
        assert_eq!(Crs::parse("CRS:84").unwrap().epsg, 4326);
        assert_eq!(Crs::parse("EPSG:900913").unwrap().epsg, 3857);
        assert!(Crs::parse("ESRI:foo").is_err());
        assert!(Crs::parse("").is_err());
    }

    #[test]
    fn test_crs_equality_ignores_name() {
        assert_eq!(Crs::new(4326, "a"), Crs::new(4326, "b"));
        assert_ne!(Crs::wgs84(), Crs::web_mercator());
    }

    #[test]
    fn test_bbox_merge() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0, None);
        let b = BoundingBox::new(-1.0, 0.5, 0.5, 3.0, None);
        let merged = BoundingBox::merge(Some(a), Some(b)).unwrap();
        assert_eq!((merged.min_x, merged.min_y, merged.max_x, merged.max_y), (-1.0, 0.0, 1.0, 3.0));
        assert!(BoundingBox::merge(None, None).is_none());
    }

    #[test]
    fn test_geometry_type_combine() {
        assert_eq!(GeometryType::Point.combine(GeometryType::MultiPoint), GeometryType::MultiPoint);
        assert_eq!(GeometryType::Point.combine(GeometryType::Polygon), GeometryType::Mixed);
        assert_eq!(GeometryType::Polygon.combine(GeometryType::Polygon), GeometryType::Polygon);
    }
}
