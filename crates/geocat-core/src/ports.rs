//! Port trait definitions
//!
//! These traits define the interfaces that catalog, database and history
//! adapters must implement. The import pipeline only talks to them through
//! `Arc<dyn ...>` handles injected at construction.

pub mod catalog;
pub mod database;
pub mod history;

pub use catalog::{Catalog, CatalogChange, CommitOutcome, LayerChange};
pub use database::{DatabaseConnector, TableSchema, TableStore};
pub use history::TaskHistoryStore;
