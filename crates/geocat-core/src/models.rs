pub mod catalog;
pub mod feature;
pub mod geometry;
pub mod import;
pub mod resource;
pub mod source;

pub use catalog::{
    LayerInfo, StoreConnection, StoreInfo, StoreKind, StyleKind, WorkspaceInfo,
};
pub use feature::Feature;
pub use geometry::{BoundingBox, Crs, Geometry, GeometryType};
pub use import::{ContextRecord, ContextState, TaskRecord, TaskState, TaskStats, UpdateMode};
pub use resource::{AttributeDescriptor, AttributeKind, CoverageParams, DataKind, ResourceDescriptor};
pub use source::{ConnectionParams, DataSource, SourceUnit};
