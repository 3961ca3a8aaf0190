//! One unit of import work and its state machine

use tokio_util::sync::CancellationToken;

use geocat_core::error::{ImportError, Result};
use geocat_core::formats::Format;
use geocat_core::models::{
    BoundingBox, Crs, ResourceDescriptor, SourceUnit, StoreInfo, StyleKind, TaskRecord, TaskState, TaskStats,
    UpdateMode,
};

use crate::transform::TransformChain;

/// An import task: one source unit that becomes one layer
///
/// Every state change goes through [`ImportTask::transition`]. Repairs
/// (`set_srs`, `set_native_bbox`, ...) are accepted while the task is not
/// terminal and take effect at the next `Importer::changed`.
#[derive(Debug)]
pub struct ImportTask {
    pub(crate) id: usize,
    pub(crate) context_id: u64,
    pub(crate) workspace: String,
    pub(crate) store: Option<StoreInfo>,
    pub(crate) source: SourceUnit,
    pub(crate) format: Option<Format>,
    pub(crate) layer_name: String,
    pub(crate) layer_name_set: bool,
    pub(crate) resource: ResourceDescriptor,
    pub(crate) transform: TransformChain,
    pub(crate) update_mode: UpdateMode,
    pub(crate) state: TaskState,
    pub(crate) message: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) style: Option<StyleKind>,
    pub(crate) stats: TaskStats,
    pub(crate) srs: Option<Crs>,
    pub(crate) native_bbox: Option<BoundingBox>,
    pub(crate) cancel: CancellationToken,
}

impl ImportTask {
    pub fn new(id: usize, source: SourceUnit, update_mode: UpdateMode) -> Self {
        let layer_name = source.base_name();
        Self {
            id,
            context_id: 0,
            workspace: String::new(),
            store: None,
            source,
            format: None,
            layer_name,
            layer_name_set: false,
            resource: ResourceDescriptor::default(),
            transform: TransformChain::new(),
            update_mode,
            state: TaskState::Init,
            message: None,
            error: None,
            style: None,
            stats: TaskStats::default(),
            srs: None,
            native_bbox: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    /// Workspace the layer is published in
    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// Target store of an indirect import
    pub fn store(&self) -> Option<&StoreInfo> {
        self.store.as_ref()
    }

    pub fn source(&self) -> &SourceUnit {
        &self.source
    }

    pub fn format(&self) -> Option<Format> {
        self.format
    }

    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    pub fn transform(&self) -> &TransformChain {
        &self.transform
    }

    pub fn update_mode(&self) -> UpdateMode {
        self.update_mode
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Why the task is in a soft failure state
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Failure recorded when the task ended in `ERROR`
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn style(&self) -> Option<&StyleKind> {
        self.style.as_ref()
    }

    pub fn stats(&self) -> TaskStats {
        self.stats
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Caller-supplied CRS, if any
    pub fn srs(&self) -> Option<&Crs> {
        self.srs.as_ref()
    }

    /// Caller-supplied native bounding box, if any
    pub fn native_bbox(&self) -> Option<&BoundingBox> {
        self.native_bbox.as_ref()
    }

    /// Move to `next`, rejecting moves the state machine does not allow
    pub fn transition(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ImportError::InvalidTransition { from: self.state, to: next });
        }
        tracing::debug!(context_id = self.context_id, task_id = self.id, layer = %self.layer_name, from = %self.state, to = %next, "Task transition");
        self.state = next;
        Ok(())
    }

    pub(crate) fn ensure_mutable(&self) -> Result<()> {
        if self.state.is_terminal() || self.state == TaskState::Running {
            return Err(ImportError::TaskTerminal { task_id: self.id, state: self.state });
        }
        Ok(())
    }

    /// Cancel the task; a terminal task is left alone and reported as such
    pub fn cancel(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(ImportError::TaskTerminal { task_id: self.id, state: self.state });
        }
        self.cancel.cancel();
        self.transition(TaskState::Canceled)?;
        tracing::info!(task_id = self.id, layer = %self.layer_name, "Task canceled");
        Ok(())
    }

    /// Token that cancels this task when triggered from anywhere
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Declare the CRS of the source, overriding what the reader found
    pub fn set_srs(&mut self, crs: Crs) -> Result<()> {
        self.ensure_mutable()?;
        self.srs = Some(crs);
        Ok(())
    }

    /// Declare the native extent, skipping bounds discovery
    pub fn set_native_bbox(&mut self, bbox: BoundingBox) -> Result<()> {
        self.ensure_mutable()?;
        self.native_bbox = Some(bbox);
        Ok(())
    }

    pub fn set_update_mode(&mut self, mode: UpdateMode) -> Result<()> {
        self.ensure_mutable()?;
        self.update_mode = mode;
        Ok(())
    }

    /// Choose the layer name instead of the one derived from the source
    pub fn set_layer_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.layer_name = name.into();
        self.layer_name_set = true;
        Ok(())
    }

    pub fn set_style(&mut self, style: StyleKind) -> Result<()> {
        self.ensure_mutable()?;
        self.style = Some(style);
        Ok(())
    }

    /// Force a format, e.g. `"csv"` or `"GeoJSON"`
    pub fn set_format_hint(&mut self, hint: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.source.set_format_hint(Some(hint.into()));
        Ok(())
    }

    /// The transform chain, for adding or clearing units
    pub fn transform_mut(&mut self) -> Result<&mut TransformChain> {
        self.ensure_mutable()?;
        Ok(&mut self.transform)
    }

    /// Put a terminal task back to `INIT` for another attempt
    pub(crate) fn reset(&mut self) {
        tracing::debug!(task_id = self.id, from = %self.state, "Task reset");
        self.state = TaskState::Init;
        self.error = None;
        self.message = None;
        self.stats = TaskStats::default();
        self.cancel = CancellationToken::new();
    }

    /// Record a soft failure or readiness reached during validation
    pub(crate) fn settle(&mut self, state: TaskState, message: Option<String>) -> Result<()> {
        self.transition(state)?;
        self.message = message;
        if state.is_soft_failure() {
            tracing::warn!(
                task_id = self.id,
                layer = %self.layer_name,
                state = %state,
                message = self.message.as_deref().unwrap_or_default(),
                "Task needs attention"
            );
        }
        Ok(())
    }

    pub(crate) fn fail(&mut self, error: &ImportError) -> Result<()> {
        self.transition(TaskState::Error)?;
        self.error = Some(error.to_string());
        tracing::error!(task_id = self.id, layer = %self.layer_name, error = %error, "Task failed");
        Ok(())
    }

    pub fn to_record(&self) -> TaskRecord {
        TaskRecord {
            id: self.id,
            source: self.source.clone(),
            format: self.format.map(|f| f.name().to_string()),
            layer_name: self.layer_name.clone(),
            update_mode: self.update_mode,
            state: self.state,
            message: self.message.clone(),
            error: self.error.clone(),
            stats: self.stats,
            native_bbox: self.resource.native_bbox.clone(),
        }
    }
}
