//! Bounding-box CRS transformation
//!
//! Only extents are reprojected: the catalog needs a geographic bbox per
//! layer, feature coordinates are stored in their native CRS.

use crate::models::{BoundingBox, Crs};
use geocat_core::error::{ImportError, Result};
use proj::Proj;

/// Number of sample points taken along each bbox edge
pub const EDGE_SAMPLES: usize = 21;

const EARTH_RADIUS: f64 = 6_378_137.0;
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_6;

/// Resolves SRS codes and reprojects bounding boxes
pub trait CrsTransformer: Send + Sync {
    /// Resolve an SRS code such as `EPSG:26713`
    fn resolve(&self, code: &str) -> Result<Crs>;

    /// Reproject `bbox` (which must carry its CRS) into `to`
    fn transform_bbox(&self, bbox: &BoundingBox, to: &Crs) -> Result<BoundingBox>;
}

/// Check if two CRS are the same
pub fn crs_match(a: &Crs, b: &Crs) -> bool {
    a.epsg == b.epsg
}

/// Default transformer: closed-form WGS 84 / Web Mercator math, PROJ for the rest
#[derive(Debug, Default, Clone)]
pub struct GeoCrsTransformer;

impl GeoCrsTransformer {
    pub fn new() -> Self {
        Self
    }

    fn projector(&self, from: &Crs, to: &Crs) -> Result<Projector> {
        if crs_match(from, to) || (is_wgs84_like(from) && is_wgs84_like(to)) {
            return Ok(Projector::Identity);
        }
        if is_wgs84_like(from) && to.epsg == 3857 {
            return Ok(Projector::ToMercator);
        }
        if from.epsg == 3857 && is_wgs84_like(to) {
            return Ok(Projector::FromMercator);
        }

        let proj = Proj::new_known_crs(&from.code(), &to.code(), None).map_err(|e| {
            ImportError::CrsTransform {
                from: from.code(),
                to: to.code(),
                reason: e.to_string(),
            }
        })?;
        Ok(Projector::Proj(proj))
    }
}

impl CrsTransformer for GeoCrsTransformer {
    fn resolve(&self, code: &str) -> Result<Crs> {
        Crs::parse(code)
    }

    fn transform_bbox(&self, bbox: &BoundingBox, to: &Crs) -> Result<BoundingBox> {
        let from = bbox.crs.clone().ok_or_else(|| ImportError::CrsTransform {
            from: "unknown".to_string(),
            to: to.code(),
            reason: "source bounding box has no CRS".to_string(),
        })?;

        if !bbox.is_valid() {
            return Err(ImportError::CrsTransform {
                from: from.code(),
                to: to.code(),
                reason: format!("invalid bounding box {}", bbox),
            });
        }

        let projector = self.projector(&from, to)?;
        if matches!(projector, Projector::Identity) {
            return Ok(bbox.clone().with_crs(Some(to.clone())));
        }

        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for (x, y) in edge_samples(bbox) {
            // Points outside the projection's domain are dropped; the rest still bound it
            let Ok((tx, ty)) = projector.convert(x, y) else {
                continue;
            };
            if !tx.is_finite() || !ty.is_finite() {
                continue;
            }
            min_x = min_x.min(tx);
            min_y = min_y.min(ty);
            max_x = max_x.max(tx);
            max_y = max_y.max(ty);
        }

        let result = BoundingBox::new(min_x, min_y, max_x, max_y, Some(to.clone()));
        if !result.is_valid() {
            return Err(ImportError::CrsTransform {
                from: from.code(),
                to: to.code(),
                reason: format!("no point of {} could be transformed", bbox),
            });
        }

        tracing::trace!(from = %from.code(), to = %to.code(), bbox = %result, "Reprojected bbox");
        Ok(result)
    }
}

enum Projector {
    Identity,
    ToMercator,
    FromMercator,
    Proj(Proj),
}

impl Projector {
    fn convert(&self, x: f64, y: f64) -> std::result::Result<(f64, f64), String> {
        match self {
            Projector::Identity => Ok((x, y)),
            Projector::ToMercator => Ok(lon_lat_to_mercator(x, y)),
            Projector::FromMercator => Ok(mercator_to_lon_lat(x, y)),
            Projector::Proj(proj) => proj.convert((x, y)).map_err(|e| e.to_string()),
        }
    }
}

/// WGS 84 and datums close enough to it for extent purposes
fn is_wgs84_like(crs: &Crs) -> bool {
    matches!(crs.epsg, 4326 | 4269 | 4258)
}

fn lon_lat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

/// Points along the four edges of `bbox`, [`EDGE_SAMPLES`] per edge
pub fn edge_samples(bbox: &BoundingBox) -> Vec<(f64, f64)> {
    let steps = (EDGE_SAMPLES - 1) as f64;
    let mut points = Vec::with_capacity(EDGE_SAMPLES * 4);
    for i in 0..EDGE_SAMPLES {
        let t = i as f64 / steps;
        let x = bbox.min_x + t * bbox.width();
        let y = bbox.min_y + t * bbox.height();
        points.push((x, bbox.min_y));
        points.push((x, bbox.max_y));
        points.push((bbox.min_x, y));
        points.push((bbox.max_x, y));
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tolerance: f64) {
        assert!((a - b).abs() < tolerance, "{} != {} (tolerance {})", a, b, tolerance);
    }

    #[test]
    fn test_identity_transform_retags_crs() {
        let transformer = GeoCrsTransformer::new();
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0, Some(Crs::from_epsg(4269)));
        let result = transformer.transform_bbox(&bbox, &Crs::wgs84()).unwrap();
        assert_eq!((result.min_x, result.max_y), (1.0, 4.0));
        assert_eq!(result.crs, Some(Crs::wgs84()));
    }

    #[test]
    fn test_wgs84_to_web_mercator() {
        let transformer = GeoCrsTransformer::new();
        let bbox = BoundingBox::new(-180.0, -85.0, 180.0, 85.0, Some(Crs::wgs84()));
        let result = transformer.transform_bbox(&bbox, &Crs::web_mercator()).unwrap();
        assert_close(result.min_x, -20_037_508.34, 1.0);
        assert_close(result.max_x, 20_037_508.34, 1.0);
        assert_close(result.max_y, 19_971_868.88, 1.0);
    }

    #[test]
    fn test_web_mercator_round_trip_bbox() {
        let transformer = GeoCrsTransformer::new();
        let bbox = BoundingBox::new(10.0, 40.0, 12.0, 45.0, Some(Crs::wgs84()));
        let projected = transformer.transform_bbox(&bbox, &Crs::web_mercator()).unwrap();
        let back = transformer.transform_bbox(&projected, &Crs::wgs84()).unwrap();
        assert_close(back.min_x, 10.0, 1e-9);
        assert_close(back.min_y, 40.0, 1e-9);
        assert_close(back.max_x, 12.0, 1e-9);
        assert_close(back.max_y, 45.0, 1e-9);
    }

    #[test]
    fn test_missing_source_crs_is_error() {
        let transformer = GeoCrsTransformer::new();
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0, None);
        let err = transformer.transform_bbox(&bbox, &Crs::wgs84()).unwrap_err();
        assert!(matches!(err, ImportError::CrsTransform { .. }));
    }

    #[test]
    fn test_edge_samples_cover_corners() {
        let bbox = BoundingBox::new(0.0, 0.0, 2.0, 1.0, None);
        let samples = edge_samples(&bbox);
        assert_eq!(samples.len(), EDGE_SAMPLES * 4);
        assert!(samples.contains(&(0.0, 0.0)));
        assert!(samples.contains(&(2.0, 1.0)));
        assert!(samples.contains(&(1.0, 0.0)));
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        let transformer = GeoCrsTransformer::new();
        assert_eq!(transformer.resolve("EPSG:26713").unwrap().epsg, 26713);
        assert!(transformer.resolve("not a crs").is_err());
    }
}
