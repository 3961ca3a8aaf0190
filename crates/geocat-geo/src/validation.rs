use crate::models::{to_geo_geometry, Geometry};

/// Validation result with details
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

/// Validation error with location details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub location: String,
    pub reason: String,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self { is_valid: true, errors: Vec::new() }
    }

    pub fn add_error(&mut self, location: String, reason: String) {
        self.is_valid = false;
        self.errors.push(ValidationError { location, reason });
    }

    /// First error reason, for rejection messages
    pub fn first_reason(&self) -> Option<&str> {
        self.errors.first().map(|e| e.reason.as_str())
    }

    fn absorb(&mut self, prefix: String, other: ValidationResult) {
        for error in other.errors {
            self.add_error(format!("{}.{}", prefix, error.location), error.reason);
        }
    }
}

/// Structural validation: finite ordinates, enough vertices, closed rings
pub fn validate_geometry(geometry: &Geometry) -> ValidationResult {
    match to_geo_geometry(geometry) {
        geo::Geometry::Point(p) => validate_point(&p),
        geo::Geometry::LineString(ls) => validate_linestring(&ls),
        geo::Geometry::Polygon(poly) => validate_polygon(&poly),
        geo::Geometry::MultiPoint(mp) => {
            let mut result = ValidationResult::valid();
            for (i, point) in mp.0.iter().enumerate() {
                result.absorb(format!("MultiPoint[{}]", i), validate_point(point));
            }
            result
        }
        geo::Geometry::MultiLineString(mls) => {
            let mut result = ValidationResult::valid();
            for (i, ls) in mls.0.iter().enumerate() {
                result.absorb(format!("MultiLineString[{}]", i), validate_linestring(ls));
            }
            result
        }
        geo::Geometry::MultiPolygon(mp) => {
            let mut result = ValidationResult::valid();
            for (i, poly) in mp.0.iter().enumerate() {
                result.absorb(format!("MultiPolygon[{}]", i), validate_polygon(poly));
            }
            result
        }
        _ => ValidationResult::valid(),
    }
}

pub fn is_valid(geometry: &Geometry) -> bool {
    validate_geometry(geometry).is_valid
}

fn validate_point(point: &geo::Point) -> ValidationResult {
    let mut result = ValidationResult::valid();
    if !point.x().is_finite() || !point.y().is_finite() {
        result.add_error(
            format!("Point({}, {})", point.x(), point.y()),
            "Coordinates must be finite".to_string(),
        );
    }
    result
}

fn validate_linestring(linestring: &geo::LineString) -> ValidationResult {
    let mut result = ValidationResult::valid();

    if linestring.0.len() < 2 {
        result.add_error(
            "LineString".to_string(),
            format!("LineString must have at least 2 points, found {}", linestring.0.len()),
        );
        return result;
    }

    for (i, coord) in linestring.0.iter().enumerate() {
        if !coord.x.is_finite() || !coord.y.is_finite() {
            result.add_error(format!("LineString[{}]", i), "Coordinates must be finite".to_string());
        }
    }

    result
}

fn validate_ring(ring: &geo::LineString, location: String) -> ValidationResult {
    let mut result = ValidationResult::valid();

    if ring.0.len() < 4 {
        result.add_error(
            location.clone(),
            format!("Ring must have at least 4 points, found {}", ring.0.len()),
        );
    }
    if let (Some(first), Some(last)) = (ring.0.first(), ring.0.last()) {
        if first != last {
            result.add_error(location.clone(), "Ring must be closed".to_string());
        }
    }
    if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        result.add_error(location, "Coordinates must be finite".to_string());
    }

    result
}

fn validate_polygon(polygon: &geo::Polygon) -> ValidationResult {
    let mut result = validate_ring(polygon.exterior(), "Polygon exterior".to_string());
    for (i, interior) in polygon.interiors().iter().enumerate() {
        let interior_result = validate_ring(interior, format!("Polygon interior[{}]", i));
        result.is_valid &= interior_result.is_valid;
        result.errors.extend(interior_result.errors);
    }
    result
}
