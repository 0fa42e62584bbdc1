//! Core plan file types
//!
//! This module defines the data structures that represent an rplay.yml plan file.

use serde::{Deserialize, Serialize};

/// Top-level plan file structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlanFile {
    /// Plan name (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Interpreter used for probe commands (e.g., ["sh", "-c"])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<Vec<String>>,

    /// Package manager backend on the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<PackageManager>,

    /// Default per-task timeout (e.g., "30s", "10m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Ordered task entries
    #[serde(default)]
    pub tasks: Vec<TaskDef>,
}

/// A single plan entry: either a task (one action key) or a block group
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDef {
    /// Task name, unique within the plan (optional on blocks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Condition gating this entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,

    /// Ensure a package is present or latest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageArgs>,

    /// Run a read-only command and capture its output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<String>,

    /// Refresh the package index
    #[serde(default, skip_serializing_if = "is_false")]
    pub update_cache: bool,

    /// Fail unconditionally with this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,

    /// Store the result under this name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register: Option<String>,

    /// Record failures without stopping the plan
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_errors: bool,

    /// Run the action once per item, substituting `{{ item }}`
    ///
    /// `None` means no loop; an empty list runs the action zero times.
    #[serde(
        rename = "loop",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_loop_items"
    )]
    pub loop_items: Option<Vec<String>>,

    /// Per-task timeout overriding the plan default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Main sequence of a group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Vec<TaskDef>>,

    /// Recovery sequence, runs when the block fails
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rescue: Vec<TaskDef>,

    /// Cleanup sequence, runs after block and rescue in every case
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub always: Vec<TaskDef>,
}

impl TaskDef {
    /// Name used in error messages
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    /// Whether this entry is a block group
    pub fn is_block(&self) -> bool {
        self.block.is_some()
    }

    /// Number of action keys set on this entry
    pub fn action_count(&self) -> usize {
        [
            self.package.is_some(),
            self.probe.is_some(),
            self.update_cache,
            self.fail.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// Arguments of the `package` action
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PackageArgs {
    /// Package name (may contain `{{ item }}`)
    pub name: String,

    /// Desired state
    #[serde(default)]
    pub state: PackageStateDef,
}

/// Desired package state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageStateDef {
    #[default]
    Present,
    Latest,
}

/// Supported package manager backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Apt,
    Dnf,
    Pacman,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Custom deserializer for loop items that accepts a single scalar or a sequence of scalars
fn deserialize_loop_items<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    fn scalar<E: Error>(value: Value) -> Result<String, E> {
        match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(E::custom("loop items must be strings, numbers or booleans")),
        }
    }

    let value = Value::deserialize(deserializer)?;

    match value {
        // Array of items
        Value::Sequence(seq) => seq
            .into_iter()
            .map(scalar::<D::Error>)
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        // Explicit null
        Value::Null => Ok(None),
        // Single item
        other => Ok(Some(vec![scalar::<D::Error>(other)?])),
    }
}
