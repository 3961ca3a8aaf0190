//! A batch of import tasks created from one data source

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tempfile::TempDir;

use geocat_core::error::{ImportError, Result};
use geocat_core::models::{ContextRecord, ContextState, DataSource, StoreInfo, TaskState};

use crate::task::ImportTask;

#[derive(Debug)]
pub struct ImportContext {
    pub(crate) id: u64,
    pub(crate) source: DataSource,
    pub(crate) target_workspace: Option<String>,
    pub(crate) target_store: Option<StoreInfo>,
    pub(crate) tasks: Vec<ImportTask>,
    pub(crate) archive: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    /// Scratch directory of an archive source; deleted when the context is dropped
    pub(crate) transient: Option<TempDir>,
    /// Local archive file the content came from
    pub(crate) archive_file: Option<PathBuf>,
}

impl ImportContext {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    pub fn target_workspace(&self) -> Option<&str> {
        self.target_workspace.as_deref()
    }

    pub fn target_store(&self) -> Option<&StoreInfo> {
        self.target_store.as_ref()
    }

    /// True when data is copied into a target store rather than registered in place
    pub fn is_indirect(&self) -> bool {
        self.target_store.is_some()
    }

    pub fn tasks(&self) -> &[ImportTask] {
        &self.tasks
    }

    pub fn task(&self, task_id: usize) -> Result<&ImportTask> {
        self.tasks
            .get(task_id)
            .ok_or(ImportError::TaskNotFound { context_id: self.id, task_id })
    }

    pub fn task_mut(&mut self, task_id: usize) -> Result<&mut ImportTask> {
        let context_id = self.id;
        self.tasks.get_mut(task_id).ok_or(ImportError::TaskNotFound { context_id, task_id })
    }

    pub fn archive(&self) -> bool {
        self.archive
    }

    /// Delete the source after a fully successful indirect import
    pub fn set_archive(&mut self, archive: bool) {
        self.archive = archive;
        self.touch();
    }

    /// Aggregate state, always derived from the current task states
    pub fn state(&self) -> ContextState {
        ContextState::aggregate(self.tasks.iter().map(|t| t.state()))
    }

    /// Number of tasks per state, in task order of first appearance
    pub fn state_counts(&self) -> Vec<(TaskState, usize)> {
        let mut counts: Vec<(TaskState, usize)> = Vec::new();
        for task in &self.tasks {
            match counts.iter_mut().find(|(s, _)| *s == task.state()) {
                Some((_, n)) => *n += 1,
                None => counts.push((task.state(), 1)),
            }
        }
        counts
    }

    pub fn all_terminal(&self) -> bool {
        self.tasks.iter().all(|t| t.is_terminal())
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn to_record(&self) -> ContextRecord {
        ContextRecord {
            id: self.id,
            source: self.source.clone(),
            target_workspace: self.target_workspace.clone(),
            target_store: self.target_store.as_ref().map(|s| s.name.clone()),
            archive: self.archive,
            state: self.state(),
            tasks: self.tasks.iter().map(|t| t.to_record()).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
