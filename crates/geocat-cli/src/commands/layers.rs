//! Layers command implementation

use crate::cli::LayersArgs;
use crate::commands::current_layout;
use crate::errors;
use crate::output::OutputWriter;
use crate::output_types::LayerRow;
use crate::storage::Storage;
use anyhow::Result;

pub async fn execute(args: LayersArgs, output: &OutputWriter) -> Result<()> {
    let layout = current_layout()?;
    let storage = Storage::open(&layout, true).await?;

    if let Some(name) = &args.workspace {
        if storage.catalog.workspace(name).await?.is_none() {
            return Err(errors::catalog_workspace_not_found(name).into());
        }
    }

    let layers = storage.catalog.layers(args.workspace.as_deref()).await?;
    if layers.is_empty() && !output.is_json() {
        output.info("No layers registered. Import data with: geocat import <source>");
        return Ok(());
    }
    output.table(layers.iter().map(LayerRow::from).collect());
    Ok(())
}
