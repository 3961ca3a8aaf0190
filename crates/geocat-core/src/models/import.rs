use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::geometry::BoundingBox;
use super::source::{DataSource, SourceUnit};
use crate::error::ImportError;

/// Lifecycle state of one import task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Init,
    NoFormat,
    BadFormat,
    NoCrs,
    NoBounds,
    Ready,
    Running,
    Complete,
    Error,
    Canceled,
}

impl TaskState {
    pub const ALL: [TaskState; 10] = [
        TaskState::Init,
        TaskState::NoFormat,
        TaskState::BadFormat,
        TaskState::NoCrs,
        TaskState::NoBounds,
        TaskState::Ready,
        TaskState::Running,
        TaskState::Complete,
        TaskState::Error,
        TaskState::Canceled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Complete | TaskState::Error | TaskState::Canceled)
    }

    /// States a caller can leave by repairing metadata, the source or the target
    pub fn is_soft_failure(&self) -> bool {
        matches!(
            self,
            TaskState::NoFormat | TaskState::BadFormat | TaskState::NoCrs | TaskState::NoBounds
        )
    }

    /// States reachable as the outcome of validation
    fn is_validation_outcome(&self) -> bool {
        self.is_soft_failure() || *self == TaskState::Ready
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        match (*self, next) {
            (Init, s) => s.is_validation_outcome() || s == Canceled,
            (s, Init) => s.is_validation_outcome(),
            (s, Canceled) => !s.is_terminal(),
            (Ready, Running) => true,
            (Running, Complete | Error) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Init => "INIT",
            TaskState::NoFormat => "NO_FORMAT",
            TaskState::BadFormat => "BAD_FORMAT",
            TaskState::NoCrs => "NO_CRS",
            TaskState::NoBounds => "NO_BOUNDS",
            TaskState::Ready => "READY",
            TaskState::Running => "RUNNING",
            TaskState::Complete => "COMPLETE",
            TaskState::Error => "ERROR",
            TaskState::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate state of an import context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextState {
    Pending,
    Running,
    Complete,
    CompleteWithErrors,
}

impl ContextState {
    /// Derive the context state from the states of its tasks
    ///
    /// A batch where every task ended in `ERROR` or `CANCELED` is also
    /// `COMPLETE_WITH_ERRORS`; tell it apart from a partial success by
    /// counting `COMPLETE` tasks.
    pub fn aggregate<I>(states: I) -> ContextState
    where
        I: IntoIterator<Item = TaskState>,
    {
        let mut any_terminal = false;
        let mut all_complete = true;
        for state in states {
            if state == TaskState::Running {
                return ContextState::Running;
            }
            any_terminal |= state.is_terminal();
            all_complete &= state == TaskState::Complete;
        }

        if !any_terminal {
            ContextState::Pending
        } else if all_complete {
            ContextState::Complete
        } else {
            ContextState::CompleteWithErrors
        }
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::Pending => f.write_str("PENDING"),
            ContextState::Running => f.write_str("RUNNING"),
            ContextState::Complete => f.write_str("COMPLETE"),
            ContextState::CompleteWithErrors => f.write_str("COMPLETE_WITH_ERRORS"),
        }
    }
}

/// How an import treats an existing resource of the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    #[default]
    Create,
    Append,
    Replace,
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateMode::Create => f.write_str("create"),
            UpdateMode::Append => f.write_str("append"),
            UpdateMode::Replace => f.write_str("replace"),
        }
    }
}

impl FromStr for UpdateMode {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(UpdateMode::Create),
            "append" => Ok(UpdateMode::Append),
            "replace" => Ok(UpdateMode::Replace),
            other => Err(ImportError::ConfigInvalid {
                key: "update_mode".to_string(),
                reason: format!("'{}' is not one of create, append, replace", other),
            }),
        }
    }
}

/// Per-task feature counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskStats {
    pub processed: usize,
    pub rejected: usize,
    pub written: usize,
}

/// Serializable view of one task, kept in the task history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: usize,
    pub source: SourceUnit,
    pub format: Option<String>,
    pub layer_name: String,
    pub update_mode: UpdateMode,
    pub state: TaskState,
    pub message: Option<String>,
    pub error: Option<String>,
    pub stats: TaskStats,
    pub native_bbox: Option<BoundingBox>,
}

/// Serializable view of an import context, kept in the task history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: u64,
    pub source: DataSource,
    pub target_workspace: Option<String>,
    pub target_store: Option<String>,
    pub archive: bool,
    pub state: ContextState,
    pub tasks: Vec<TaskRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
