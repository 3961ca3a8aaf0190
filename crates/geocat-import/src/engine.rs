//! The importer: builds contexts, validates tasks and executes them
//!
//! Tasks of one context run sequentially in creation order. Name resolution,
//! data write and catalog commit of a task happen under the write lock of its
//! workspace, so contexts running concurrently never claim the same name.

use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

use geocat_core::config::LayeredConfig;
use geocat_core::error::{ImportError, Result};
use geocat_core::formats::{BoundsHint, Format, FormatReader, FormatRegistry, SourceContent};
use geocat_core::models::{
    BoundingBox, ContextState, Crs, DataSource, Feature, ResourceDescriptor, SourceUnit, StoreConnection,
    StoreInfo, TaskState, UpdateMode,
};
use geocat_core::ports::{
    Catalog, DatabaseConnector, LayerChange, TableSchema, TableStore, TaskHistoryStore,
};
use geocat_geo::bounds::{compute_bbox, BoundsAccumulator};
use geocat_geo::{CrsTransformer, GeoCrsTransformer};

use crate::bridge::{normalize_name, CatalogBridge};
use crate::context::ImportContext;
use crate::resolve::resolve_source;
use crate::task::ImportTask;
use crate::transform::{Outcome, TransformContext};

/// Importer behaviour derived from the layered configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ImporterSettings {
    /// Workspace used when a context names none
    pub default_workspace: String,
    /// Initial `archive` flag of new contexts
    pub archive: bool,
    /// Initial update mode of new tasks
    pub update_mode: UpdateMode,
    /// Scan features for an extent when a reader cannot report one
    pub compute_bounds: bool,
    pub download_timeout: Duration,
    /// Where archives registered in place are unpacked; they outlive the context
    pub uploads_dir: Option<PathBuf>,
}

impl Default for ImporterSettings {
    fn default() -> Self {
        Self::from(&LayeredConfig::with_defaults())
    }
}

impl From<&LayeredConfig> for ImporterSettings {
    fn from(config: &LayeredConfig) -> Self {
        Self {
            default_workspace: config.workspace.value.clone(),
            archive: config.archive.value,
            update_mode: config.update_mode.value,
            compute_bounds: config.compute_bounds.value,
            download_timeout: Duration::from_secs(config.download_timeout_secs.value),
            uploads_dir: None,
        }
    }
}

/// Progress information emitted while a context runs
#[derive(Debug, Clone)]
pub struct ImportProgress {
    pub context_id: u64,
    pub task_id: usize,
    pub layer_name: String,
    pub state: TaskState,
    /// Tasks handled so far
    pub current: usize,
    pub total: usize,
}

impl ImportProgress {
    fn of(task: &ImportTask, current: usize, total: usize) -> Self {
        Self {
            context_id: task.context_id(),
            task_id: task.id(),
            layer_name: task.layer_name().to_string(),
            state: task.state(),
            current,
            total,
        }
    }
}

/// How an executed task ended when it did not fail
enum Finish {
    Done,
    Canceled,
}

/// Soft failure found while validating a task
struct Blocked {
    state: TaskState,
    message: String,
}

impl Blocked {
    fn new(state: TaskState, message: impl Into<String>) -> Self {
        Self { state, message: message.into() }
    }
}

/// Entry point of the import pipeline
#[derive(Clone)]
pub struct Importer {
    catalog: Arc<dyn Catalog>,
    connector: Arc<dyn DatabaseConnector>,
    history: Arc<dyn TaskHistoryStore>,
    registry: Arc<FormatRegistry>,
    bridge: CatalogBridge,
    settings: ImporterSettings,
    workspace_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl Importer {
    /// Create an importer with the standard format registry and the default settings
    pub fn new(
        catalog: Arc<dyn Catalog>,
        connector: Arc<dyn DatabaseConnector>,
        history: Arc<dyn TaskHistoryStore>,
    ) -> Self {
        let transformer: Arc<dyn CrsTransformer> = Arc::new(GeoCrsTransformer::new());
        Self {
            bridge: CatalogBridge::new(catalog.clone(), transformer),
            registry: Arc::new(FormatRegistry::standard(connector.clone())),
            catalog,
            connector,
            history,
            settings: ImporterSettings::default(),
            workspace_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_settings(mut self, settings: ImporterSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the format registry
    pub fn with_registry(mut self, registry: FormatRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Replace the CRS transformer used for geographic extents
    pub fn with_transformer(mut self, transformer: Arc<dyn CrsTransformer>) -> Self {
        self.bridge = CatalogBridge::new(self.catalog.clone(), transformer);
        self
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn history(&self) -> &Arc<dyn TaskHistoryStore> {
        &self.history
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &ImporterSettings {
        &self.settings
    }

    /// Resolve `source` into a context with one prepped task per unit
    ///
    /// Fails without creating anything when the source cannot be opened or
    /// the target workspace or store is unusable.
    pub async fn create_context(
        &self,
        source: DataSource,
        target_workspace: Option<&str>,
        target_store: Option<&str>,
    ) -> Result<ImportContext> {
        let workspace = self.resolve_workspace(target_workspace).await?;
        let target_store = match target_store {
            Some(name) => Some(self.resolve_target_store(&workspace, name).await?),
            None => None,
        };

        let unpack_into = match (&source, &target_store) {
            (DataSource::RemoteArchive { locator }, None) => Some(self.uploads_dir(locator)?),
            _ => None,
        };
        let resolved = resolve_source(
            &source,
            &self.registry,
            self.connector.as_ref(),
            self.settings.download_timeout,
            unpack_into,
        )
        .await?;

        let tasks = resolved
            .units
            .into_iter()
            .enumerate()
            .map(|(id, unit)| {
                let mut task = ImportTask::new(id, unit, self.settings.update_mode);
                task.workspace = workspace.clone();
                task.store = target_store.clone();
                task
            })
            .collect();

        let now = Utc::now();
        let mut ctx = ImportContext {
            id: 0,
            source,
            target_workspace: Some(workspace),
            target_store,
            tasks,
            archive: self.settings.archive,
            created_at: now,
            updated_at: now,
            transient: resolved.transient,
            archive_file: resolved.archive_file,
        };
        ctx.id = self.history.create(ctx.to_record()).await?;

        for task in &mut ctx.tasks {
            task.context_id = ctx.id;
            self.prep(task).await?;
        }
        self.persist(&ctx).await?;

        tracing::info!(
            context_id = ctx.id,
            source = %ctx.source,
            kind = ctx.source.kind_name(),
            tasks = ctx.tasks.len(),
            state = %ctx.state(),
            "Import context created"
        );
        Ok(ctx)
    }

    /// Validate a task and move it to `READY` or a soft failure state
    ///
    /// Returns whether the task is ready to run.
    pub async fn prep(&self, task: &mut ImportTask) -> Result<bool> {
        task.ensure_mutable()?;
        if task.state() != TaskState::Init {
            task.transition(TaskState::Init)?;
        }
        task.message = None;

        match self.validate(task).await? {
            None => task.settle(TaskState::Ready, None)?,
            Some(blocked) => task.settle(blocked.state, Some(blocked.message))?,
        }
        Ok(task.state() == TaskState::Ready)
    }

    /// Re-validate a task after a repair
    pub async fn changed(&self, ctx: &mut ImportContext, task_id: usize) -> Result<bool> {
        let ready = self.prep(ctx.task_mut(task_id)?).await?;
        ctx.touch();
        self.persist(ctx).await?;
        Ok(ready)
    }

    /// Scan a task's features for its extent, then re-validate it
    pub async fn compute_bounds(&self, ctx: &mut ImportContext, task_id: usize) -> Result<bool> {
        let task = ctx.task_mut(task_id)?;
        task.ensure_mutable()?;

        let format = self.registry.detect(&task.source).ok_or_else(|| ImportError::FormatError {
            format: "unknown".to_string(),
            message: format!("No reader recognizes {}", task.source),
        })?;
        let reader = self.registry.reader(format)?;
        let crs = task.srs.clone().or_else(|| task.resource.crs.clone());
        if let Some(bbox) = self.scan_bounds(task, reader, crs).await? {
            task.native_bbox = Some(bbox);
        }

        let ready = self.prep(task).await?;
        ctx.touch();
        self.persist(ctx).await?;
        Ok(ready)
    }

    /// Reset a task and validate it again
    pub async fn rerun_task(&self, ctx: &mut ImportContext, task_id: usize) -> Result<bool> {
        let task = ctx.task_mut(task_id)?;
        if task.state() == TaskState::Running {
            return Err(ImportError::TaskTerminal { task_id, state: task.state() });
        }
        if task.is_terminal() {
            task.reset();
        }

        let ready = self.prep(task).await?;
        ctx.touch();
        self.persist(ctx).await?;
        Ok(ready)
    }

    /// Change the target store of every non-terminal task and re-validate them
    pub async fn retarget(&self, ctx: &mut ImportContext, store: Option<&str>) -> Result<ContextState> {
        let workspace = match ctx.target_workspace.clone() {
            Some(workspace) => workspace,
            None => self.resolve_workspace(None).await?,
        };
        let target = match store {
            Some(name) => Some(self.resolve_target_store(&workspace, name).await?),
            None => None,
        };

        if target.is_none() {
            if let Some(unpacked) = ctx.transient.as_ref().map(|dir| dir.path().to_path_buf()) {
                let in_temp = ctx
                    .tasks
                    .iter()
                    .filter(|t| !t.is_terminal())
                    .flat_map(|t| t.source.location())
                    .any(|path| path.starts_with(&unpacked));
                if in_temp {
                    return Err(ImportError::SourceUnavailable {
                        location: ctx.source.to_string(),
                        reason: "unpacked archive content is temporary and cannot be registered in place"
                            .to_string(),
                    });
                }
            }
        }

        ctx.target_store = target.clone();
        for task in ctx.tasks.iter_mut().filter(|t| !t.is_terminal()) {
            task.store = target.clone();
            self.prep(task).await?;
        }
        ctx.touch();
        self.persist(ctx).await?;
        Ok(ctx.state())
    }

    /// Token that cancels `task` when triggered, from any thread
    pub fn cancel_token(&self, task: &ImportTask) -> CancellationToken {
        task.cancel_token()
    }

    pub async fn cancel(&self, ctx: &mut ImportContext, task_id: usize) -> Result<()> {
        ctx.task_mut(task_id)?.cancel()?;
        ctx.touch();
        self.persist(ctx).await
    }

    /// Run every ready task of the context
    pub async fn run(&self, ctx: &mut ImportContext) -> Result<ContextState> {
        self.run_with_progress(ctx, |_| {}).await
    }

    /// Run every ready task of the context with progress reporting
    pub async fn run_with_progress<F>(&self, ctx: &mut ImportContext, mut progress: F) -> Result<ContextState>
    where
        F: FnMut(ImportProgress),
    {
        let total = ctx.tasks.len();
        tracing::info!(context_id = ctx.id, tasks = total, "Running import");

        for index in 0..total {
            let task = &mut ctx.tasks[index];
            if task.is_cancel_requested() && !task.is_terminal() {
                task.transition(TaskState::Canceled)?;
                tracing::info!(context_id = task.context_id, task_id = task.id, "Task canceled before start");
            }
            if task.state() != TaskState::Ready {
                tracing::debug!(task_id = task.id, state = %task.state(), "Skipping task");
                progress(ImportProgress::of(task, index + 1, total));
                continue;
            }

            task.transition(TaskState::Running)?;
            progress(ImportProgress::of(task, index, total));
            ctx.touch();
            self.persist_quietly(ctx).await;

            let task = &mut ctx.tasks[index];
            match self.execute(task).await {
                Ok(Finish::Done) => {
                    task.transition(TaskState::Complete)?;
                    tracing::info!(
                        context_id = task.context_id,
                        task_id = task.id,
                        layer = %task.layer_name,
                        processed = task.stats.processed,
                        rejected = task.stats.rejected,
                        written = task.stats.written,
                        "Task complete"
                    );
                }
                Ok(Finish::Canceled) => {
                    task.transition(TaskState::Canceled)?;
                    tracing::info!(task_id = task.id, layer = %task.layer_name, "Task canceled while running");
                }
                Err(e) => task.fail(&e)?,
            }
            progress(ImportProgress::of(task, index + 1, total));
            ctx.touch();
            self.persist_quietly(ctx).await;
        }

        if ctx.all_terminal() {
            self.archive(ctx).await;
        }
        ctx.touch();
        self.persist(ctx).await?;

        let state = ctx.state();
        tracing::info!(context_id = ctx.id, state = %state, "Import finished");
        Ok(state)
    }

    /// Run independent contexts concurrently, one tokio task each
    pub async fn run_all(&self, contexts: Vec<ImportContext>) -> Vec<Result<ImportContext>> {
        let handles = contexts.into_iter().map(|mut ctx| {
            let importer = self.clone();
            tokio::spawn(async move {
                importer.run(&mut ctx).await?;
                Ok(ctx)
            })
        });

        futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.map_err(|e| ImportError::Worker(e.to_string())).and_then(|r| r))
            .collect()
    }

    /// Persistent directory for an archive registered in place
    fn uploads_dir(&self, locator: &str) -> Result<&Path> {
        self.settings.uploads_dir.as_deref().ok_or_else(|| ImportError::SourceUnavailable {
            location: locator.to_string(),
            reason: "archives need a target store unless an uploads directory is configured".to_string(),
        })
    }

    async fn resolve_workspace(&self, requested: Option<&str>) -> Result<String> {
        if let Some(name) = requested {
            return match self.catalog.workspace(name).await? {
                Some(workspace) => Ok(workspace.name),
                None => Err(ImportError::WorkspaceNotFound { name: name.to_string() }),
            };
        }

        let configured = &self.settings.default_workspace;
        if self.catalog.workspace(configured).await?.is_some() {
            return Ok(configured.clone());
        }
        match self.catalog.default_workspace().await? {
            Some(workspace) => Ok(workspace.name),
            None => Ok(configured.clone()),
        }
    }

    async fn resolve_target_store(&self, workspace: &str, name: &str) -> Result<StoreInfo> {
        let store = self.catalog.store(workspace, name).await?.ok_or_else(|| ImportError::StoreNotFound {
            workspace: workspace.to_string(),
            name: name.to_string(),
        })?;
        let params = store.connection_params().ok_or_else(|| ImportError::InvalidTarget {
            store: store.name.clone(),
            reason: "file stores cannot receive imported data".to_string(),
        })?;
        self.connector.connect(params).await?;
        Ok(store)
    }

    async fn validate(&self, task: &mut ImportTask) -> Result<Option<Blocked>> {
        let Some(format) = self.registry.detect(&task.source) else {
            task.format = None;
            return Ok(Some(Blocked::new(
                TaskState::NoFormat,
                format!("No reader recognizes {}", task.source),
            )));
        };
        task.format = Some(format);

        let reader = match self.registry.reader(format) {
            Ok(reader) => reader,
            Err(e) => return Ok(Some(Blocked::new(TaskState::NoFormat, e.to_string()))),
        };
        match reader.validate(&task.source).await {
            Ok(validation) if validation.is_valid() => {
                for warning in &validation.warnings {
                    tracing::warn!(task_id = task.id, format = %format, warning = %warning, "Format warning");
                }
            }
            Ok(validation) => {
                return Ok(Some(Blocked::new(TaskState::NoFormat, validation.errors.join("; "))))
            }
            Err(e) => return Ok(Some(Blocked::new(TaskState::NoFormat, e.to_string()))),
        }

        if let Some(store) = &task.store {
            if !store.kind.accepts(format.kind()) {
                return Ok(Some(Blocked::new(
                    TaskState::BadFormat,
                    format!("{} store '{}' cannot hold {} data", store.kind, store.name, format.kind()),
                )));
            }
        }

        let metadata = match reader.inspect(&task.source).await {
            Ok(metadata) => metadata,
            Err(e) => return Ok(Some(Blocked::new(TaskState::NoFormat, e.to_string()))),
        };

        let crs = task.srs.clone().or_else(|| metadata.crs.clone());
        task.resource = ResourceDescriptor {
            native_name: String::new(),
            kind: metadata.kind,
            crs: crs.clone(),
            native_bbox: None,
            lat_lon_bbox: None,
            attributes: task.transform.attributes(metadata.attributes.clone()),
            geometry_type: task.transform.geometry_type(metadata.geometry_type),
            feature_count: metadata.feature_count,
            coverage: metadata.coverage.clone(),
        };

        let Some(crs) = crs else {
            return Ok(Some(Blocked::new(
                TaskState::NoCrs,
                "No coordinate reference system found; declare one with set_srs",
            )));
        };

        let native = match self.native_bounds(task, reader, metadata.bounds, &crs).await {
            Ok(Some(bbox)) => bbox,
            Ok(None) => {
                return Ok(Some(Blocked::new(
                    TaskState::NoBounds,
                    "Extent unknown; declare one with set_native_bbox or compute it from the features",
                )))
            }
            Err(e) => return Ok(Some(Blocked::new(TaskState::NoFormat, e.to_string()))),
        };
        if let Err(e) = self.bridge.apply_bounds(&mut task.resource, native) {
            return Ok(Some(Blocked::new(
                TaskState::NoCrs,
                format!("Cannot derive geographic bounds: {}", e),
            )));
        }

        let candidate = name_candidate(task);
        task.layer_name = match task.update_mode {
            UpdateMode::Create => self.bridge.unique_layer_name(&task.workspace, &candidate).await?,
            UpdateMode::Append | UpdateMode::Replace => normalize_name(&candidate),
        };
        task.resource.native_name = task.layer_name.clone();
        Ok(None)
    }

    /// Explicit extent, else what the reader reports, else a scan when enabled
    async fn native_bounds(
        &self,
        task: &ImportTask,
        reader: &dyn FormatReader,
        hint: BoundsHint,
        crs: &Crs,
    ) -> Result<Option<BoundingBox>> {
        if let Some(explicit) = &task.native_bbox {
            let bbox = match explicit.crs {
                Some(_) => explicit.clone(),
                None => explicit.clone().with_crs(Some(crs.clone())),
            };
            return Ok(Some(bbox));
        }

        match hint {
            BoundsHint::Known(bbox) => Ok(Some(bbox.with_crs(Some(crs.clone())))),
            BoundsHint::RequiresScan if self.settings.compute_bounds => {
                self.scan_bounds(task, reader, Some(crs.clone())).await
            }
            BoundsHint::RequiresScan | BoundsHint::Unavailable => Ok(None),
        }
    }

    /// Extent of the features that survive the task's transform chain
    async fn scan_bounds(
        &self,
        task: &ImportTask,
        reader: &dyn FormatReader,
        crs: Option<Crs>,
    ) -> Result<Option<BoundingBox>> {
        let SourceContent::Features(features) = reader.read(&task.source).await? else {
            return Ok(None);
        };

        let ctx = transform_context(task);
        let mut acc = BoundsAccumulator::new();
        for feature in features {
            if let Outcome::Keep(feature) = task.transform.apply_vector(feature, &ctx)? {
                if let Some(geometry) = &feature.geometry {
                    acc.add(geometry);
                }
            }
        }
        tracing::debug!(task_id = task.id, geometries = acc.count(), "Scanned extent");
        Ok(acc.finish(crs))
    }

    async fn execute(&self, task: &mut ImportTask) -> Result<Finish> {
        let _guard = self.lock_workspace(&task.workspace).await;
        match task.store.clone() {
            Some(store) if !is_table_of(&task.source, &store) => self.run_indirect(task, &store).await,
            target => self.run_direct(task, target).await,
        }
    }

    /// Copy the unit's features into the target store's database
    async fn run_indirect(&self, task: &mut ImportTask, store: &StoreInfo) -> Result<Finish> {
        let params = store.connection_params().ok_or_else(|| ImportError::InvalidTarget {
            store: store.name.clone(),
            reason: "file stores cannot receive imported data".to_string(),
        })?;
        let format = task_format(task)?;
        let features = match self.registry.reader(format)?.read(&task.source).await? {
            SourceContent::Features(features) => features,
            SourceContent::Coverage(_) => {
                return Err(ImportError::InvalidTarget {
                    store: store.name.clone(),
                    reason: "raster data cannot be written to a tabular store".to_string(),
                })
            }
        };
        let kept = apply_chain(task, features)?;
        if task.is_cancel_requested() {
            return Ok(Finish::Canceled);
        }

        let db = self.connector.connect(params).await?;
        // Rows of an existing table as they were before this task; `None` when the task creates it
        let (table, prior) = match task.update_mode {
            UpdateMode::Create => {
                let table = self.bridge.unique_layer_name(&task.workspace, &name_candidate(task)).await?;
                if db.has_table(&table).await? {
                    return Err(ImportError::TableExists { table });
                }
                db.create_table(&table_schema(&table, &task.resource)).await?;
                (table, None)
            }
            UpdateMode::Append | UpdateMode::Replace => {
                let table = normalize_name(&name_candidate(task));
                if let Some(layer) = self.catalog.layer(&task.workspace, &table).await? {
                    if layer.store != store.name {
                        return Err(ImportError::LayerExists { store: layer.store, name: table });
                    }
                }
                if !db.has_table(&table).await? {
                    db.create_table(&table_schema(&table, &task.resource)).await?;
                    (table, None)
                } else {
                    let rows = db.read(&table).await?;
                    if task.update_mode == UpdateMode::Replace {
                        db.truncate(&table).await?;
                    }
                    (table, Some(rows))
                }
            }
        };

        match self.write_and_register(task, store, db.as_ref(), &table, kept).await {
            Ok(()) => Ok(Finish::Done),
            Err(e) => {
                rollback_table(db.as_ref(), &table, prior).await;
                Err(e)
            }
        }
    }

    async fn write_and_register(
        &self,
        task: &mut ImportTask,
        store: &StoreInfo,
        db: &dyn TableStore,
        table: &str,
        features: Vec<Feature>,
    ) -> Result<()> {
        task.stats.written = db.insert(table, &features).await?;
        let count = db.count(table).await?;

        let existing = match task.update_mode {
            UpdateMode::Create => None,
            UpdateMode::Append | UpdateMode::Replace => self
                .catalog
                .layer(&task.workspace, table)
                .await?
                .filter(|layer| layer.store == store.name),
        };

        let mut resource = task.resource.clone();
        resource.native_name = table.to_string();
        resource.feature_count = Some(count);

        let written = match &task.native_bbox {
            Some(explicit) => Some(explicit.clone()),
            None => compute_bbox(features.iter().filter_map(|f| f.geometry.as_ref()), resource.crs.clone()),
        };
        let native = match (&existing, task.update_mode) {
            (Some(layer), UpdateMode::Append) => BoundingBox::merge(written, layer.resource.native_bbox.clone()),
            _ => written,
        }
        .or_else(|| resource.native_bbox.clone());
        if let Some(native) = native {
            self.bridge.apply_bounds(&mut resource, native)?;
        }

        let style = task.style.clone().or_else(|| existing.as_ref().map(|l| l.style.clone()));
        let layer = self.bridge.layer(&task.workspace, &store.name, table, resource.clone(), style.as_ref());
        let change = match existing {
            Some(_) => LayerChange::Update(layer),
            None => LayerChange::Add(layer),
        };
        self.bridge.register(&task.workspace, None, change).await?;

        task.layer_name = table.to_string();
        task.resource = resource;
        Ok(())
    }

    /// Register the unit in place, in `target` or in a store pointing at it
    async fn run_direct(&self, task: &mut ImportTask, target: Option<StoreInfo>) -> Result<Finish> {
        if task.update_mode != UpdateMode::Create {
            return Err(ImportError::UnsupportedUpdateMode {
                mode: task.update_mode,
                reason: "data registered in place can only be added as a new layer".to_string(),
            });
        }

        let format = task_format(task)?;
        let mut resource = task.resource.clone();
        match self.registry.reader(format)?.read(&task.source).await? {
            SourceContent::Features(features) => {
                let kept = apply_chain(task, features)?;
                task.stats.written = kept.len();
                resource.feature_count = Some(kept.len());
                if task.native_bbox.is_none() {
                    let geometries = kept.iter().filter_map(|f| f.geometry.as_ref());
                    if let Some(bbox) = compute_bbox(geometries, resource.crs.clone()) {
                        self.bridge.apply_bounds(&mut resource, bbox)?;
                    }
                }
            }
            SourceContent::Coverage(params) => {
                let ctx = transform_context(task);
                resource.coverage = Some(task.transform.apply_raster(params, &ctx)?);
            }
        }
        if task.is_cancel_requested() {
            return Ok(Finish::Canceled);
        }

        let store = match target {
            Some(store) => store,
            None => self.direct_store(task, format).await?,
        };
        let name = self.bridge.unique_layer_name(&task.workspace, &name_candidate(task)).await?;
        resource.native_name = native_name(&task.source);

        let layer = self.bridge.layer(&task.workspace, &store.name, &name, resource.clone(), task.style.as_ref());
        self.bridge.register(&task.workspace, Some(store), LayerChange::Add(layer)).await?;

        task.layer_name = name;
        task.resource = resource;
        Ok(Finish::Done)
    }

    /// Existing store with the unit's connection, or a new one to commit
    async fn direct_store(&self, task: &ImportTask, format: Format) -> Result<StoreInfo> {
        match &task.source {
            SourceUnit::FileGroup { primary, .. } => {
                let connection = StoreConnection::File {
                    path: primary.clone(),
                    format: format.name().to_string(),
                };
                if let Some(existing) = self.bridge.store_with_connection(&task.workspace, &connection).await? {
                    return Ok(existing);
                }
                let name = self.bridge.unique_store_name(&task.workspace, &task.source.base_name()).await?;
                Ok(StoreInfo::file(&task.workspace, name, primary.clone(), format.name()))
            }
            SourceUnit::Table { params, .. } => self.bridge.table_store(&task.workspace, params).await,
        }
    }

    /// Delete the source of a fully successful indirect import
    async fn archive(&self, ctx: &mut ImportContext) {
        if !ctx.archive || !ctx.is_indirect() || ctx.source.is_database() || ctx.state() != ContextState::Complete {
            return;
        }

        for path in ctx.tasks.iter().flat_map(|t| t.source.location()) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed source file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove source file"),
            }
        }

        match &ctx.source {
            DataSource::Directory { path } => {
                remove_empty_dirs(path);
            }
            DataSource::RemoteArchive { .. } => {
                if let Some(dir) = ctx.transient.take() {
                    if let Err(e) = dir.close() {
                        tracing::warn!(error = %e, "Failed to remove unpacked archive");
                    }
                }
                if let Some(file) = ctx.archive_file.take() {
                    if let Err(e) = tokio::fs::remove_file(&file).await {
                        tracing::warn!(path = %file.display(), error = %e, "Failed to remove archive file");
                    }
                }
            }
            DataSource::SingleFile { .. } | DataSource::Database { .. } => {}
        }
        tracing::info!(context_id = ctx.id, source = %ctx.source, "Source archived");
    }

    async fn lock_workspace(&self, workspace: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.workspace_locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(workspace.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    async fn persist(&self, ctx: &ImportContext) -> Result<()> {
        self.history.update(ctx.to_record()).await
    }

    async fn persist_quietly(&self, ctx: &ImportContext) {
        if let Err(e) = self.persist(ctx).await {
            tracing::warn!(context_id = ctx.id, error = %e, "Failed to record import progress");
        }
    }
}

/// Undo a failed write: drop a table the task created, else restore its prior rows
async fn rollback_table(db: &dyn TableStore, table: &str, prior: Option<Vec<Feature>>) {
    let Some(rows) = prior else {
        if let Err(e) = db.drop_table(table).await {
            tracing::warn!(table = %table, error = %e, "Failed to drop table after failed import");
        }
        return;
    };

    let restored = match db.truncate(table).await {
        Ok(()) => db.insert(table, &rows).await.map(|_| ()),
        Err(e) => Err(e),
    };
    match restored {
        Ok(()) => tracing::debug!(table = %table, rows = rows.len(), "Restored table after failed import"),
        Err(e) => tracing::warn!(table = %table, error = %e, "Failed to restore table after failed import"),
    }
}

/// Caller-set layer name, else the unit's base name
fn name_candidate(task: &ImportTask) -> String {
    if task.layer_name_set {
        task.layer_name.clone()
    } else {
        task.source.base_name()
    }
}

fn native_name(unit: &SourceUnit) -> String {
    match unit {
        SourceUnit::FileGroup { primary, .. } => primary
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string(),
        SourceUnit::Table { table, .. } => table.clone(),
    }
}

fn task_format(task: &ImportTask) -> Result<Format> {
    task.format.ok_or_else(|| ImportError::FormatError {
        format: "unknown".to_string(),
        message: format!("No format detected for {}", task.source),
    })
}

/// True when the unit is a table of the store's own database
fn is_table_of(unit: &SourceUnit, store: &StoreInfo) -> bool {
    matches!(unit, SourceUnit::Table { params, .. } if store.connection_params() == Some(params))
}

fn transform_context(task: &ImportTask) -> TransformContext {
    TransformContext {
        context_id: task.context_id,
        task_id: task.id,
        layer_name: task.layer_name.clone(),
        crs: task.resource.crs.clone(),
    }
}

/// Run features through the task's chain, counting what is kept and rejected
fn apply_chain(task: &mut ImportTask, features: Vec<Feature>) -> Result<Vec<Feature>> {
    let ctx = transform_context(task);
    let mut kept = Vec::with_capacity(features.len());
    for feature in features {
        task.stats.processed += 1;
        match task.transform.apply_vector(feature, &ctx)? {
            Outcome::Keep(feature) => kept.push(feature),
            Outcome::Reject(_) => task.stats.rejected += 1,
        }
    }
    Ok(kept)
}

fn table_schema(name: &str, resource: &ResourceDescriptor) -> TableSchema {
    TableSchema {
        name: name.to_string(),
        attributes: resource.attributes.clone(),
        geometry_type: resource.geometry_type,
        crs: resource.crs.clone(),
    }
}

/// Remove `dir` and its subdirectories when they hold no files
fn remove_empty_dirs(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    let mut empty = true;
    for entry in entries.flatten() {
        let path = entry.path();
        if !(path.is_dir() && remove_empty_dirs(&path)) {
            empty = false;
        }
    }
    empty && std::fs::remove_dir(dir).is_ok()
}
