//! Actions
//!
//! An action is an idempotent unit of work run against an [`Executor`].
//! Actions describe what happened; they never decide what a failure means
//! for the rest of the plan. That is the runner's job.

use crate::config::{PackageArgs, PackageStateDef, TaskDef};
use crate::error::{ErrorKind, TransportError};
use crate::runner::{substitute_item, Deadline, Executor, PackageState};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of one action execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub succeeded: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl ActionResult {
    /// Successful result that left the target untouched
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            output: output.into(),
            exit_code: None,
            changed: false,
            error: None,
        }
    }

    /// Successful result that modified the target
    pub fn changed(output: impl Into<String>) -> Self {
        Self {
            changed: true,
            ..Self::ok(output)
        }
    }

    /// Failed result
    pub fn failed(kind: ErrorKind, output: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            output: output.into(),
            exit_code: None,
            changed: false,
            error: Some(kind),
        }
    }

    /// Failed result from a transport error
    pub fn from_transport(err: &TransportError) -> Self {
        Self::failed(ErrorKind::from(err), err.to_string())
    }

    pub fn failed_flag(&self) -> bool {
        !self.succeeded
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }
}

/// The work a task performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Install if absent, upgrade if outdated
    PackageLatest { name: String },

    /// Install if absent
    PackagePresent { name: String },

    /// Refresh the package index
    UpdateCache,

    /// Run a read-only command and capture its output
    Probe { command: String },

    /// Fail with a message
    Fail { message: String },
}

impl Action {
    /// Create from a plan entry, `None` when the entry carries no action
    pub fn from_config(def: &TaskDef) -> Option<Self> {
        if let Some(package) = &def.package {
            let name = package.name.clone();
            return Some(match package.state {
                PackageStateDef::Latest => Action::PackageLatest { name },
                PackageStateDef::Present => Action::PackagePresent { name },
            });
        }
        if let Some(command) = &def.probe {
            return Some(Action::Probe {
                command: command.clone(),
            });
        }
        if def.update_cache {
            return Some(Action::UpdateCache);
        }
        def.fail.as_ref().map(|message| Action::Fail {
            message: message.clone(),
        })
    }

    /// Write this action's keys onto a plan entry
    pub fn write_config(&self, def: &mut TaskDef) {
        match self {
            Action::PackageLatest { name } => {
                def.package = Some(PackageArgs {
                    name: name.clone(),
                    state: PackageStateDef::Latest,
                })
            }
            Action::PackagePresent { name } => {
                def.package = Some(PackageArgs {
                    name: name.clone(),
                    state: PackageStateDef::Present,
                })
            }
            Action::UpdateCache => def.update_cache = true,
            Action::Probe { command } => def.probe = Some(command.clone()),
            Action::Fail { message } => def.fail = Some(message.clone()),
        }
    }

    /// Copy of this action with `{{ item }}` replaced in every parameter
    pub fn with_item(&self, item: &str) -> Self {
        match self {
            Action::PackageLatest { name } => Action::PackageLatest {
                name: substitute_item(name, item),
            },
            Action::PackagePresent { name } => Action::PackagePresent {
                name: substitute_item(name, item),
            },
            Action::UpdateCache => Action::UpdateCache,
            Action::Probe { command } => Action::Probe {
                command: substitute_item(command, item),
            },
            Action::Fail { message } => Action::Fail {
                message: substitute_item(message, item),
            },
        }
    }

    /// Parameters that may contain the loop placeholder
    pub fn parameters(&self) -> Vec<&str> {
        match self {
            Action::PackageLatest { name } | Action::PackagePresent { name } => vec![name],
            Action::Probe { command } => vec![command],
            Action::Fail { message } => vec![message],
            Action::UpdateCache => Vec::new(),
        }
    }

    /// Short human description
    pub fn describe(&self) -> String {
        match self {
            Action::PackageLatest { name } => format!("package {} latest", name),
            Action::PackagePresent { name } => format!("package {} present", name),
            Action::UpdateCache => "update package cache".to_string(),
            Action::Probe { command } => format!("probe `{}`", command),
            Action::Fail { message } => format!("fail: {}", message),
        }
    }

    /// Apply the action to the target
    pub fn execute(&self, target: &mut dyn Executor, deadline: &Deadline) -> ActionResult {
        debug!(action = %self.describe(), "executing");

        match self {
            Action::PackageLatest { name } => ensure_package(target, name, true, deadline),
            Action::PackagePresent { name } => ensure_package(target, name, false, deadline),
            Action::UpdateCache => match target.update_cache(deadline) {
                Ok(true) => ActionResult::changed("package cache updated"),
                Ok(false) => ActionResult::ok("package cache already current"),
                Err(err) => ActionResult::from_transport(&err),
            },
            Action::Probe { command } => probe(target, command, deadline),
            Action::Fail { message } => ActionResult::failed(ErrorKind::ActionFailure, message.clone()),
        }
    }
}

fn ensure_package(
    target: &mut dyn Executor,
    name: &str,
    latest: bool,
    deadline: &Deadline,
) -> ActionResult {
    let state = match target.package_state(name, deadline) {
        Ok(state) => state,
        Err(err) => return ActionResult::from_transport(&err),
    };

    let step = match (state, latest) {
        (PackageState::Absent, _) => target
            .install_package(name, deadline)
            .map(|()| format!("{} installed", name)),
        (PackageState::Outdated, true) => target
            .upgrade_package(name, deadline)
            .map(|()| format!("{} upgraded", name)),
        (PackageState::Outdated, false) | (PackageState::Installed, _) => {
            return ActionResult::ok(format!("{} already {}", name, if latest { "latest" } else { "present" }));
        }
    };

    match step {
        Ok(message) => ActionResult::changed(message),
        Err(err) => ActionResult::from_transport(&err),
    }
}

/// A probe never changes the target. A nonzero exit and a failure to launch
/// both surface as `succeeded: false`.
fn probe(target: &mut dyn Executor, command: &str, deadline: &Deadline) -> ActionResult {
    match target.run_command(command, deadline) {
        Ok(output) if output.success() => {
            ActionResult::ok(output.stdout.trim_end()).with_exit_code(output.exit_code)
        }
        Ok(output) => {
            let text = if output.stdout.trim().is_empty() {
                output.stderr.trim_end()
            } else {
                output.stdout.trim_end()
            };
            ActionResult::failed(ErrorKind::ActionFailure, text).with_exit_code(output.exit_code)
        }
        Err(err) => ActionResult::from_transport(&err),
    }
}
