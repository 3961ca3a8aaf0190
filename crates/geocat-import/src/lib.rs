//! GeoCat Import - The import pipeline
//!
//! This crate turns a data source into an import context of tasks, validates
//! each task through its repairable state machine, runs the ready ones and
//! registers the results in the catalog.

pub mod bridge;
pub mod context;
pub mod engine;
pub mod resolve;
pub mod task;
pub mod transform;

pub use bridge::{normalize_name, unique_name, CatalogBridge};
pub use context::ImportContext;
pub use engine::{ImportProgress, Importer, ImporterSettings};
pub use resolve::{resolve_source, ResolvedSource};
pub use task::ImportTask;
pub use transform::{
    AttributeLimit, AttributeRename, CoordinatesToPoint, DropEmptyGeometry, DropInvalidGeometry, OverviewLevel,
    Outcome, RasterTransform, SelectBands, TransformChain, TransformContext, TransformUnit, VectorTransform,
};
