//! Plan file validation
//!
//! Structural checks on a parsed plan file. Reference and predicate checks
//! happen when the runtime plan is built (`runner::Plan::from_config`).

use crate::config::parse::parse_duration;
use crate::config::types::{PlanFile, TaskDef};
use crate::error::{ConfigError, ConfigResult};

/// Validate a complete plan file
pub fn validate_plan(plan: &PlanFile) -> ConfigResult<()> {
    if let Some(interpreter) = &plan.interpreter {
        if interpreter.is_empty() {
            return Err(ConfigError::Invalid(
                "interpreter must name at least one program".to_string(),
            ));
        }
    }

    if let Some(timeout) = &plan.timeout {
        parse_duration(timeout)?;
    }

    for entry in &plan.tasks {
        validate_entry(entry)?;
    }

    Ok(())
}

/// Validate a single entry and, for blocks, everything nested in it
pub fn validate_entry(entry: &TaskDef) -> ConfigResult<()> {
    if entry.is_block() {
        validate_block(entry)
    } else {
        validate_task(entry)
    }
}

fn validate_task(entry: &TaskDef) -> ConfigResult<()> {
    if entry.action_count() != 1 {
        return Err(ConfigError::AmbiguousEntry(entry.label().to_string()));
    }

    match &entry.name {
        Some(name) if !name.trim().is_empty() => {}
        _ => {
            return Err(ConfigError::Invalid(
                "every task needs a non-empty name".to_string(),
            ))
        }
    }

    if !entry.rescue.is_empty() {
        return Err(misplaced(entry, "rescue", "alongside block"));
    }
    if !entry.always.is_empty() {
        return Err(misplaced(entry, "always", "alongside block"));
    }

    if let Some(register) = &entry.register {
        if register.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "task '{}' has an empty register name",
                entry.label()
            )));
        }
    }

    if let Some(timeout) = &entry.timeout {
        parse_duration(timeout)?;
    }

    Ok(())
}

fn validate_block(entry: &TaskDef) -> ConfigResult<()> {
    if entry.action_count() != 0 {
        return Err(ConfigError::AmbiguousEntry(entry.label().to_string()));
    }

    if entry.register.is_some() {
        return Err(misplaced(entry, "register", "on tasks"));
    }
    if entry.ignore_errors {
        return Err(misplaced(entry, "ignore_errors", "on tasks"));
    }
    if entry.loop_items.is_some() {
        return Err(misplaced(entry, "loop", "on tasks"));
    }
    if entry.timeout.is_some() {
        return Err(misplaced(entry, "timeout", "on tasks"));
    }

    let nested = entry
        .block
        .iter()
        .flatten()
        .chain(entry.rescue.iter())
        .chain(entry.always.iter());

    for child in nested {
        validate_entry(child)?;
    }

    Ok(())
}

fn misplaced(entry: &TaskDef, field: &str, allowed: &'static str) -> ConfigError {
    ConfigError::MisplacedField {
        entry: entry.label().to_string(),
        field: field.to_string(),
        allowed,
    }
}
