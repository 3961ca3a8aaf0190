//! GeoCat Geo - Geometry, bounds and CRS operations
//!
//! This crate computes feature extents, validates geometries and reprojects
//! bounding boxes between coordinate reference systems.

pub mod bounds;
pub mod models;
pub mod transform;
pub mod validation;

pub use transform::{CrsTransformer, GeoCrsTransformer};
