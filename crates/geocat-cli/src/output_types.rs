use chrono::{DateTime, Utc};
use geocat_core::config::LayeredConfig;
use geocat_core::formats::Format;
use geocat_core::models::{ContextRecord, LayerInfo, StoreConnection, StoreInfo, TaskRecord};
use geocat_import::{ImportContext, ImportTask};
use serde::Serialize;
use tabled::Tabled;

/// Output for init command
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub workspace_path: String,
    pub default_workspace: String,
    pub config_written: bool,
}

/// Output for import command
#[derive(Debug, Serialize)]
pub struct ImportOutput {
    pub context_id: u64,
    pub source: String,
    pub workspace: Option<String>,
    pub store: Option<String>,
    pub archive: bool,
    pub state: String,
    pub tasks: Vec<TaskRow>,
}

impl ImportOutput {
    pub fn from_context(ctx: &ImportContext) -> Self {
        Self {
            context_id: ctx.id(),
            source: ctx.source().to_string(),
            workspace: ctx.target_workspace().map(str::to_string),
            store: ctx.target_store().map(|s| s.name.clone()),
            archive: ctx.archive(),
            state: ctx.state().to_string(),
            tasks: ctx.tasks().iter().map(TaskRow::from_task).collect(),
        }
    }
}

/// One task of an import context
#[derive(Debug, Serialize, Tabled)]
pub struct TaskRow {
    #[tabled(rename = "#")]
    pub id: usize,
    #[tabled(rename = "Source")]
    pub source: String,
    #[tabled(rename = "Format")]
    pub format: String,
    #[tabled(rename = "Layer")]
    pub layer: String,
    #[tabled(rename = "Mode")]
    pub update_mode: String,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Written")]
    pub written: usize,
    #[tabled(rename = "Rejected")]
    pub rejected: usize,
    #[tabled(rename = "Details")]
    pub details: String,
}

impl TaskRow {
    pub fn from_task(task: &ImportTask) -> Self {
        Self::from_record(&task.to_record())
    }

    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            id: record.id,
            source: record.source.to_string(),
            format: record.format.clone().unwrap_or_else(|| "-".to_string()),
            layer: record.layer_name.clone(),
            update_mode: record.update_mode.to_string(),
            state: record.state.to_string(),
            written: record.stats.written,
            rejected: record.stats.rejected,
            details: record
                .error
                .clone()
                .or_else(|| record.message.clone())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct LayerRow {
    #[tabled(rename = "Workspace")]
    pub workspace: String,
    #[tabled(rename = "Layer")]
    pub name: String,
    #[tabled(rename = "Store")]
    pub store: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "CRS")]
    pub crs: String,
    #[tabled(rename = "Features")]
    pub features: String,
    #[tabled(rename = "Style")]
    pub style: String,
    #[tabled(rename = "Lat/Lon Bounds")]
    pub bounds: String,
}

impl From<&LayerInfo> for LayerRow {
    fn from(layer: &LayerInfo) -> Self {
        let resource = &layer.resource;
        Self {
            workspace: layer.workspace.clone(),
            name: layer.name.clone(),
            store: layer.store.clone(),
            kind: resource.kind.to_string(),
            crs: resource.crs.as_ref().map(|c| c.code()).unwrap_or_else(|| "-".to_string()),
            features: resource.feature_count.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
            style: layer.style.to_string(),
            bounds: resource
                .lat_lon_bbox
                .as_ref()
                .map(|b| format!("{:.4}, {:.4}, {:.4}, {:.4}", b.min_x, b.min_y, b.max_x, b.max_y))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct StoreRow {
    #[tabled(rename = "Workspace")]
    pub workspace: String,
    #[tabled(rename = "Store")]
    pub name: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Connection")]
    pub connection: String,
}

impl From<&StoreInfo> for StoreRow {
    fn from(store: &StoreInfo) -> Self {
        let connection = match &store.connection {
            StoreConnection::File { path, format } => format!("{} ({})", path.display(), format),
            StoreConnection::Database(params) => params.to_string(),
        };
        Self {
            workspace: store.workspace.clone(),
            name: store.name.clone(),
            kind: store.kind.to_string(),
            connection,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct WorkspaceRow {
    #[tabled(rename = "Workspace")]
    pub name: String,
    #[tabled(rename = "Stores")]
    pub stores: usize,
    #[tabled(rename = "Layers")]
    pub layers: usize,
}

/// One recorded import context
#[derive(Debug, Serialize, Tabled)]
pub struct HistoryRow {
    #[tabled(rename = "ID")]
    pub id: u64,
    #[tabled(rename = "Source")]
    pub source: String,
    #[tabled(rename = "Target")]
    pub target: String,
    #[tabled(rename = "Tasks")]
    pub tasks: usize,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Updated")]
    pub updated_at: String,
}

fn display_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

impl From<&ContextRecord> for HistoryRow {
    fn from(record: &ContextRecord) -> Self {
        let workspace = record.target_workspace.clone().unwrap_or_else(|| "-".to_string());
        let target = match &record.target_store {
            Some(store) => format!("{}:{}", workspace, store),
            None => workspace,
        };
        Self {
            id: record.id,
            source: record.source.to_string(),
            target,
            tasks: record.tasks.len(),
            state: record.state.to_string(),
            updated_at: display_time(&record.updated_at),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct FormatRow {
    #[tabled(rename = "Format")]
    pub name: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Extensions")]
    pub extensions: String,
    #[tabled(rename = "Sidecars")]
    pub sidecars: String,
}

impl From<Format> for FormatRow {
    fn from(format: Format) -> Self {
        let join = |exts: &[&str]| {
            if exts.is_empty() {
                "-".to_string()
            } else {
                exts.iter().map(|e| format!(".{}", e)).collect::<Vec<_>>().join(" ")
            }
        };
        Self {
            name: format.name().to_string(),
            kind: format.kind().to_string(),
            extensions: join(format.extensions()),
            sidecars: join(format.sidecar_extensions()),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct ConfigRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Source")]
    pub source: String,
}

impl ConfigRow {
    pub fn rows(config: &LayeredConfig) -> Vec<Self> {
        config
            .to_inspection_map()
            .into_iter()
            .map(|(key, (value, source))| Self { key, value, source: source.to_string() })
            .collect()
    }
}
