use crate::output::OutputWriter;
use console::style;
use serde::Serialize;
use std::fmt;

/// One step a command would take without `--dry-run`
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    pub action_type: ActionType,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateDirectory,
    CreateFile,
    CreateDatabase,
    RegisterWorkspace,
    RegisterStore,
    RegisterLayer,
    WriteTable,
    SkipTask,
    DeleteSource,
    ClearHistory,
}

impl ActionType {
    /// Actions that leave state untouched even when executed
    pub fn is_noop(&self) -> bool {
        matches!(self, ActionType::SkipTask)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionType::CreateDirectory => "mkdir",
            ActionType::CreateFile => "create",
            ActionType::CreateDatabase => "database",
            ActionType::RegisterWorkspace => "workspace",
            ActionType::RegisterStore => "store",
            ActionType::RegisterLayer => "layer",
            ActionType::WriteTable => "write",
            ActionType::SkipTask => "skip",
            ActionType::DeleteSource => "delete",
            ActionType::ClearHistory => "clear",
        };
        f.write_str(label)
    }
}

impl PlannedAction {
    pub fn new(action_type: ActionType, description: impl Into<String>) -> Self {
        Self { action_type, description: description.into(), details: Vec::new() }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }
}

#[derive(Serialize)]
struct DryRunReport<'a> {
    dry_run: bool,
    changes: usize,
    planned_actions: &'a [PlannedAction],
}

/// Print what a command would do; nothing has been written at this point
pub fn display_planned_actions(output: &OutputWriter, actions: &[PlannedAction]) {
    let changes = actions.iter().filter(|a| !a.action_type.is_noop()).count();

    if output.is_json() {
        let report = DryRunReport { dry_run: true, changes, planned_actions: actions };
        if let Err(e) = output.result(report) {
            output.warning(format!("Cannot render planned actions: {}", e));
        }
        return;
    }

    output.section("Planned Actions (Dry Run)");
    for action in actions {
        let label = format!("{:>9}", action.action_type);
        let label = if action.action_type.is_noop() { style(label).dim() } else { style(label).cyan() };
        println!("{} {}", label, action.description);
        for detail in &action.details {
            println!("{:>9} {}", "", style(detail).dim());
        }
    }
    output.info(format!("{} change(s) planned; run without --dry-run to apply them", changes));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planned_action_details() {
        let action = PlannedAction::new(ActionType::RegisterLayer, "Register layer topp:archsites")
            .with_detail("Source: /data/archsites.shp")
            .with_detail("CRS: EPSG:26713");

        assert_eq!(action.details.len(), 2);
        assert_eq!(action.action_type.to_string(), "layer");
    }

    #[test]
    fn test_skipped_tasks_are_not_changes() {
        assert!(ActionType::SkipTask.is_noop());
        assert!(!ActionType::DeleteSource.is_noop());

        let json = serde_json::to_string(&PlannedAction::new(ActionType::WriteTable, "Write roads")).unwrap();
        assert!(json.contains("write_table"));
        assert!(!json.contains("details"));
    }
}
