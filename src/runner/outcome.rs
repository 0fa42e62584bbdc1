//! Run outcome
//!
//! The structured record of a finished run: what each task did, whether the
//! run was aborted and by whom, and every registered result.

use crate::error::ErrorKind;
use crate::exit_codes;
use crate::runner::{AbortCause, ActionResult, Registry};
use serde::Serialize;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Pending,
    Running,
    Completed,
    Aborted,
}

/// What happened to one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Ran and succeeded
    Completed,
    /// Did not run
    Skipped,
    /// Failed, and `ignore_errors` kept the plan going
    Ignored,
    /// Failed and escalated
    Failed,
    /// Failed inside a block, and the rescue section recovered it
    Rescued,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Ignored => "ignored",
            TaskStatus::Failed => "failed",
            TaskStatus::Rescued => "rescued",
        }
    }

    /// Whether the task's action actually ran
    pub fn ran(&self) -> bool {
        !matches!(self, TaskStatus::Skipped)
    }
}

/// Why a task was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Its condition (or its group's) evaluated to false
    Condition,
    /// Its condition read a result that was never registered
    Unresolved,
}

/// One line of the execution report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub name: String,
    pub status: TaskStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,

    /// Registry name an unresolved condition tried to read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unresolved: Option<String>,

    /// Aggregate result, absent for skipped tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,

    /// Per-item results for loop tasks
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ActionResult>,

    /// The task's registration replaced an earlier result
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub overwrote: bool,
}

impl TaskRecord {
    pub fn skipped(name: &str, reason: SkipReason, unresolved: Option<String>) -> Self {
        TaskRecord {
            name: name.to_string(),
            status: TaskStatus::Skipped,
            skip_reason: Some(reason),
            unresolved,
            result: None,
            items: Vec::new(),
            overwrote: false,
        }
    }

    pub fn output(&self) -> Option<&str> {
        self.result.as_ref().map(|result| result.output.as_str())
    }

    pub fn changed(&self) -> bool {
        self.result.as_ref().is_some_and(|result| result.changed)
    }
}

/// Terminal record of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,

    pub state: RunState,

    /// Every task that was reached, in execution order
    pub tasks: Vec<TaskRecord>,

    pub aborted: bool,

    /// `aborted_run` for an unhandled failure, `cancelled` for cancellation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<ErrorKind>,

    /// The task whose failure aborted the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted_by: Option<AbortCause>,

    /// All registered results at the end of the run
    pub registry: Registry,
}

impl RunOutcome {
    pub fn record(&self, name: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|record| record.name == name)
    }

    pub fn status_of(&self, name: &str) -> Option<TaskStatus> {
        self.record(name).map(|record| record.status)
    }

    /// Names of tasks whose action ran, in order
    pub fn trace(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|record| record.status.ran())
            .map(|record| record.name.as_str())
            .collect()
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks
            .iter()
            .filter(|record| record.status == status)
            .count()
    }

    pub fn changed_count(&self) -> usize {
        self.tasks.iter().filter(|record| record.changed()).count()
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match (self.aborted, self.abort_reason) {
            (false, _) => exit_codes::OK,
            (true, Some(ErrorKind::Cancelled)) => exit_codes::CANCELLED,
            (true, _) => exit_codes::ABORTED,
        }
    }
}
