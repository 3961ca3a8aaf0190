//! Formats command implementation

use crate::output::OutputWriter;
use crate::output_types::FormatRow;
use geocat_core::formats::FormatRegistry;
use geocat_store::JsonDatabaseConnector;
use std::sync::Arc;

pub fn execute(output: &OutputWriter) -> anyhow::Result<()> {
    let registry = FormatRegistry::standard(Arc::new(JsonDatabaseConnector::new(".")));
    output.table(registry.formats().into_iter().map(FormatRow::from).collect());
    Ok(())
}
