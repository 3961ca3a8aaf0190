//! Extent computation over features

use geo::BoundingRect;

use crate::models::{rect_to_bbox, to_geo_geometry, BoundingBox, Crs, Geometry};

/// Bounding box of one geometry; `None` for empty geometries
pub fn geometry_bbox(geometry: &Geometry) -> Option<BoundingBox> {
    if geometry.is_empty() {
        return None;
    }
    to_geo_geometry(geometry)
        .bounding_rect()
        .map(|rect| rect_to_bbox(rect, None))
        .filter(|bbox| bbox.is_valid())
}

/// Running union of geometry extents
#[derive(Debug, Clone, Default)]
pub struct BoundsAccumulator {
    bbox: Option<BoundingBox>,
    geometries: usize,
}

impl BoundsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, geometry: &Geometry) {
        if let Some(bbox) = geometry_bbox(geometry) {
            self.geometries += 1;
            self.bbox = BoundingBox::merge(self.bbox.take(), Some(bbox));
        }
    }

    /// Number of geometries that contributed an extent
    pub fn count(&self) -> usize {
        self.geometries
    }

    /// Final extent tagged with `crs`; `None` when no geometry was seen
    pub fn finish(self, crs: Option<Crs>) -> Option<BoundingBox> {
        self.bbox.map(|b| b.with_crs(crs))
    }
}

/// Extent of a set of geometries
pub fn compute_bbox<'a, I>(geometries: I, crs: Option<Crs>) -> Option<BoundingBox>
where
    I: IntoIterator<Item = &'a Geometry>,
{
    let mut acc = BoundsAccumulator::new();
    for geometry in geometries {
        acc.add(geometry);
    }
    acc.finish(crs)
}
