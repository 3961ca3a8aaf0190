use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{AttributeDescriptor, ConnectionParams, Crs, Feature, GeometryType};

/// Column layout of a feature table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDescriptor>,
    pub geometry_type: Option<GeometryType>,
    pub crs: Option<Crs>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: Vec::new(), geometry_type: None, crs: None }
    }
}

/// Port for opening tabular database backends
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    /// Open the backend described by `params`
    ///
    /// Fails with `DatabaseUnavailable` when the backend cannot be reached.
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn TableStore>>;
}

/// Port for a database holding feature tables
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Schema of an existing table
    async fn describe(&self, table: &str) -> Result<TableSchema>;

    async fn has_table(&self, table: &str) -> Result<bool>;

    /// Create an empty table; fails with `TableExists` if present
    async fn create_table(&self, schema: &TableSchema) -> Result<()>;

    /// Append features, returning how many were written
    async fn insert(&self, table: &str, features: &[Feature]) -> Result<usize>;

    /// Remove every row of a table
    async fn truncate(&self, table: &str) -> Result<()>;

    async fn count(&self, table: &str) -> Result<usize>;

    async fn read(&self, table: &str) -> Result<Vec<Feature>>;

    async fn drop_table(&self, table: &str) -> Result<()>;
}
