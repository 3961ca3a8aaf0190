//! Conversions between the canonical `Geometry` and `geo` crate types

use geo::Geometry as GeoGeometry;

pub use geocat_core::models::{BoundingBox, Crs, Geometry, GeometryType};

fn coords(points: &[[f64; 2]]) -> geo::LineString {
    geo::LineString::new(points.iter().map(|c| geo::Coord { x: c[0], y: c[1] }).collect())
}

fn polygon(rings: &[Vec<[f64; 2]>]) -> geo::Polygon {
    let mut rings = rings.iter().map(|r| coords(r));
    let exterior = rings.next().unwrap_or_else(|| geo::LineString::new(vec![]));
    geo::Polygon::new(exterior, rings.collect())
}

/// Convert a canonical Geometry to a geo::Geometry
pub fn to_geo_geometry(geom: &Geometry) -> GeoGeometry {
    match geom {
        Geometry::Point { coordinates } => {
            GeoGeometry::Point(geo::Point::new(coordinates[0], coordinates[1]))
        }
        Geometry::LineString { coordinates } => GeoGeometry::LineString(coords(coordinates)),
        Geometry::Polygon { coordinates } => GeoGeometry::Polygon(polygon(coordinates)),
        Geometry::MultiPoint { coordinates } => GeoGeometry::MultiPoint(geo::MultiPoint::new(
            coordinates.iter().map(|c| geo::Point::new(c[0], c[1])).collect(),
        )),
        Geometry::MultiLineString { coordinates } => GeoGeometry::MultiLineString(
            geo::MultiLineString::new(coordinates.iter().map(|l| coords(l)).collect()),
        ),
        Geometry::MultiPolygon { coordinates } => GeoGeometry::MultiPolygon(
            geo::MultiPolygon::new(coordinates.iter().map(|p| polygon(p)).collect()),
        ),
    }
}

/// Convert a `geo::Rect` to a bounding box in the given CRS
pub fn rect_to_bbox(rect: geo::Rect, crs: Option<Crs>) -> BoundingBox {
    BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y, crs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_conversion_keeps_holes() {
        let geometry = Geometry::polygon(vec![
            vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 0.0]],
            vec![[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 1.0]],
        ]);
        match to_geo_geometry(&geometry) {
            GeoGeometry::Polygon(p) => {
                assert_eq!(p.exterior().0.len(), 4);
                assert_eq!(p.interiors().len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
