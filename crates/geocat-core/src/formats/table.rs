//! Reader for tables of a database backend
//!
//! Table units are produced when a database source is expanded; the reader
//! reaches the backend through the injected `DatabaseConnector`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{ImportError, Result};
use crate::formats::{
    BoundsHint, Format, FormatReader, FormatValidation, SourceContent, SourceMetadata,
};
use crate::models::{ConnectionParams, DataKind, SourceUnit};
use crate::ports::{DatabaseConnector, TableStore};

pub struct TableReader {
    connector: Arc<dyn DatabaseConnector>,
}

impl TableReader {
    pub fn new(connector: Arc<dyn DatabaseConnector>) -> Self {
        Self { connector }
    }

    async fn open<'a>(&self, unit: &'a SourceUnit) -> Result<(Arc<dyn TableStore>, &'a str)> {
        let (params, table) = table_unit(unit)?;
        Ok((self.connector.connect(params).await?, table))
    }
}

fn table_unit(unit: &SourceUnit) -> Result<(&ConnectionParams, &str)> {
    match unit {
        SourceUnit::Table { params, table } => Ok((params, table.as_str())),
        SourceUnit::FileGroup { primary, .. } => Err(ImportError::FormatError {
            format: Format::Table.name().to_string(),
            message: format!("{} is a file, not a table", primary.display()),
        }),
    }
}

#[async_trait]
impl FormatReader for TableReader {
    fn format(&self) -> Format {
        Format::Table
    }

    async fn inspect(&self, unit: &SourceUnit) -> Result<SourceMetadata> {
        let (store, table) = self.open(unit).await?;
        let schema = store.describe(table).await?;
        let count = store.count(table).await?;

        Ok(SourceMetadata {
            kind: DataKind::Vector,
            crs: schema.crs,
            bounds: BoundsHint::RequiresScan,
            attributes: schema.attributes,
            geometry_type: schema.geometry_type,
            feature_count: Some(count),
            coverage: None,
        })
    }

    async fn read(&self, unit: &SourceUnit) -> Result<SourceContent> {
        let (store, table) = self.open(unit).await?;
        Ok(SourceContent::Features(store.read(table).await?))
    }

    async fn validate(&self, unit: &SourceUnit) -> Result<FormatValidation> {
        let mut validation = FormatValidation::default();
        match self.open(unit).await {
            Ok((store, table)) => {
                if !store.has_table(table).await? {
                    validation.errors.push(format!("Table not found: {}", table));
                }
            }
            Err(e) => validation.errors.push(e.to_string()),
        }
        Ok(validation)
    }
}
