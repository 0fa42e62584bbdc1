//! Terminal output
//!
//! Human-readable rendering of plans and run outcomes. Rendering returns
//! strings so the CLI decides where they go.

use crate::error::ErrorKind;
use crate::runner::{Plan, RunOutcome, SkipReason, Step, TaskRecord, TaskStatus};
use colored::{ColoredString, Colorize};
use std::fmt::Write;

fn status_label(record: &TaskRecord) -> ColoredString {
    let label = format!("{:<9}", record.status.as_str());
    match record.status {
        TaskStatus::Completed if record.changed() => format!("{:<9}", "changed").yellow(),
        TaskStatus::Completed => label.green(),
        TaskStatus::Skipped => label.cyan(),
        TaskStatus::Ignored => label.yellow(),
        TaskStatus::Failed => label.red().bold(),
        TaskStatus::Rescued => label.magenta(),
    }
}

fn detail(record: &TaskRecord) -> String {
    match (record.skip_reason, &record.unresolved) {
        (Some(SkipReason::Unresolved), Some(name)) => format!("'{}' was never registered", name),
        (Some(_), _) => "condition false".to_string(),
        (None, _) => record
            .output()
            .and_then(|output| output.lines().next())
            .unwrap_or_default()
            .to_string(),
    }
}

/// Render the execution report
pub fn render_report(outcome: &RunOutcome) -> String {
    let mut out = String::new();

    if let Some(name) = &outcome.plan {
        let _ = writeln!(out, "{} {}", "PLAN".bold(), name.bold());
    }

    let width = outcome
        .tasks
        .iter()
        .map(|record| record.name.len())
        .max()
        .unwrap_or(0);

    for record in &outcome.tasks {
        let _ = writeln!(
            out,
            "  {} {:<width$}  {}",
            status_label(record),
            record.name,
            detail(record).dimmed(),
            width = width
        );
        if record.overwrote {
            let _ = writeln!(out, "            {}", "overwrote an earlier registered result".dimmed());
        }
    }

    let _ = writeln!(
        out,
        "\n{} {} completed, {} changed, {} skipped, {} ignored, {} rescued, {} failed",
        "Summary:".bold(),
        outcome.count(TaskStatus::Completed),
        outcome.changed_count(),
        outcome.count(TaskStatus::Skipped),
        outcome.count(TaskStatus::Ignored),
        outcome.count(TaskStatus::Rescued),
        outcome.count(TaskStatus::Failed),
    );

    match (outcome.abort_reason, &outcome.aborted_by) {
        (Some(ErrorKind::Cancelled), _) => {
            let _ = writeln!(out, "{}", "Run cancelled".red().bold());
        }
        (Some(_), Some(cause)) => {
            let _ = writeln!(
                out,
                "{} by task '{}' ({})",
                "Run aborted".red().bold(),
                cause.task,
                cause.kind
            );
            if !outcome.registry.is_empty() {
                let _ = writeln!(out, "{}", "Registered results:".bold());
                for (name, result) in outcome.registry.iter() {
                    let state = if result.succeeded() { "succeeded" } else { "failed" };
                    let _ = writeln!(out, "  {}: {}", name, state);
                }
            }
        }
        _ => {
            let _ = writeln!(out, "{}", "Run completed".green().bold());
        }
    }

    out
}

/// Render the task list of a plan, one line per task, groups indented
pub fn render_plan(plan: &Plan) -> String {
    let mut out = String::new();
    if let Some(name) = plan.name() {
        let _ = writeln!(out, "{}", name.bold());
    }
    render_steps(&mut out, plan.steps(), 1);
    out
}

fn render_steps(out: &mut String, steps: &[Step], depth: usize) {
    let indent = "  ".repeat(depth);
    for step in steps {
        match step {
            Step::Task(task) => {
                let mut line = format!("{}{} {}", indent, task.name.green(), task.action.describe().dimmed());
                if let Some(when) = &task.when {
                    let _ = write!(line, " when {}", when.to_string().cyan());
                }
                if let Some(register) = &task.register {
                    let _ = write!(line, " -> {}", register.yellow());
                }
                let _ = writeln!(out, "{}", line);
            }
            Step::Group(group) => {
                let _ = writeln!(out, "{}{}", indent, group.label().bold());
                for (section, steps) in [("block", &group.block), ("rescue", &group.rescue), ("always", &group.always)] {
                    if steps.is_empty() {
                        continue;
                    }
                    let _ = writeln!(out, "{}  {}:", indent, section);
                    render_steps(out, steps, depth + 2);
                }
            }
        }
    }
}
