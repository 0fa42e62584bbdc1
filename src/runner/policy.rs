//! Failure policy
//!
//! Decides what a task failure means for the rest of the plan, and how the
//! sections of a block/rescue/always group combine into one outcome.

use crate::error::ErrorKind;
use crate::runner::ActionResult;
use serde::Serialize;

/// Per-task failure handling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// A failure stops the enclosing sequence
    #[default]
    Abort,
    /// A failure is recorded and the plan continues
    Ignore,
}

impl FailurePolicy {
    pub fn from_ignore_errors(ignore_errors: bool) -> Self {
        if ignore_errors {
            FailurePolicy::Ignore
        } else {
            FailurePolicy::Abort
        }
    }

    pub fn ignores_errors(&self) -> bool {
        matches!(self, FailurePolicy::Ignore)
    }
}

/// Result of applying a policy to an action result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The action succeeded
    Passed,
    /// The action failed and the policy swallowed it
    Suppressed(ErrorKind),
    /// The action failed and the failure propagates
    Escalate(ErrorKind),
}

/// Apply a policy to a task's (aggregate) result
pub fn judge(policy: FailurePolicy, result: &ActionResult) -> Verdict {
    if result.succeeded {
        return Verdict::Passed;
    }

    let kind = result.error.unwrap_or(ErrorKind::ActionFailure);
    match policy {
        FailurePolicy::Ignore => Verdict::Suppressed(kind),
        FailurePolicy::Abort => Verdict::Escalate(kind),
    }
}

/// Task whose failure stopped a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbortCause {
    pub task: String,
    pub kind: ErrorKind,
}

/// How a sequence of steps ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Every step ran or was skipped; nothing escalated
    Continue,
    /// A step escalated a failure
    Failed(AbortCause),
    /// Cancellation stopped the sequence
    Cancelled,
}

impl Flow {
    pub fn is_continue(&self) -> bool {
        matches!(self, Flow::Continue)
    }
}

/// Combine the sections of a block/rescue/always group
///
/// `rescue` is `None` when the rescue section did not run, either because the
/// block succeeded or because the group has no rescue section. The group
/// fails when the block fails with no rescue, when rescue fails, or when
/// always fails; the earliest failure is reported. Cancellation wins over
/// everything.
pub fn resolve_group(block: Flow, rescue: Option<Flow>, always: Flow) -> Flow {
    if [Some(&block), rescue.as_ref(), Some(&always)]
        .into_iter()
        .flatten()
        .any(|flow| matches!(flow, Flow::Cancelled))
    {
        return Flow::Cancelled;
    }

    let primary = match (block, rescue) {
        (Flow::Continue, _) => Flow::Continue,
        (failed, None) => failed,
        (_, Some(rescued)) => rescued,
    };

    match primary {
        Flow::Continue => always,
        failed => failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(task: &str) -> Flow {
        Flow::Failed(AbortCause {
            task: task.to_string(),
            kind: ErrorKind::ActionFailure,
        })
    }

    #[test]
    fn test_judge_success() {
        let result = ActionResult::ok("");
        assert_eq!(judge(FailurePolicy::Abort, &result), Verdict::Passed);
        assert_eq!(judge(FailurePolicy::Ignore, &result), Verdict::Passed);
    }

    #[test]
    fn test_judge_failure() {
        let result = ActionResult::failed(ErrorKind::Timeout, "slow");
        assert_eq!(
            judge(FailurePolicy::Abort, &result),
            Verdict::Escalate(ErrorKind::Timeout)
        );
        assert_eq!(
            judge(FailurePolicy::Ignore, &result),
            Verdict::Suppressed(ErrorKind::Timeout)
        );
    }

    #[test]
    fn test_policy_from_ignore_errors() {
        assert_eq!(FailurePolicy::from_ignore_errors(false), FailurePolicy::Abort);
        assert!(FailurePolicy::from_ignore_errors(true).ignores_errors());
        assert_eq!(FailurePolicy::default(), FailurePolicy::Abort);
    }

    #[test]
    fn test_group_all_good() {
        assert_eq!(
            resolve_group(Flow::Continue, None, Flow::Continue),
            Flow::Continue
        );
    }

    #[test]
    fn test_group_rescued() {
        assert_eq!(
            resolve_group(failed("main"), Some(Flow::Continue), Flow::Continue),
            Flow::Continue
        );
    }

    #[test]
    fn test_group_without_rescue_propagates() {
        assert_eq!(
            resolve_group(failed("main"), None, Flow::Continue),
            failed("main")
        );
    }

    #[test]
    fn test_group_rescue_failure_propagates() {
        assert_eq!(
            resolve_group(failed("main"), Some(failed("fix")), Flow::Continue),
            failed("fix")
        );
    }

    #[test]
    fn test_group_always_failure_propagates() {
        assert_eq!(
            resolve_group(Flow::Continue, None, failed("cleanup")),
            failed("cleanup")
        );
        // the earlier failure is the one reported
        assert_eq!(
            resolve_group(failed("main"), None, failed("cleanup")),
            failed("main")
        );
    }

    #[test]
    fn test_group_cancellation_wins() {
        assert_eq!(
            resolve_group(failed("main"), Some(Flow::Cancelled), Flow::Continue),
            Flow::Cancelled
        );
    }
}
