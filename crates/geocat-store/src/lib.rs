//! GeoCat Store - Catalog, database and history adapters
//!
//! This crate provides the reference implementations of the ports defined in
//! `geocat_core::ports`: in-memory adapters for tests and embedding, and
//! JSON-file adapters used by the CLI.

pub mod json;
pub mod memory;
mod state;

pub use json::{JsonCatalog, JsonDatabaseConnector, JsonHistoryStore};
pub use memory::{MemoryCatalog, MemoryConnector, MemoryHistoryStore, MemoryTableStore};
