//! Result registry
//!
//! Registered task outcomes, keyed by the task's `register` name. One runner
//! owns one registry for the duration of a run.

use crate::error::ErrorKind;
use crate::runner::ActionResult;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Registered outcome of a task, with per-item results for loops
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    /// Aggregate result that conditions are evaluated against
    #[serde(flatten)]
    pub result: ActionResult,

    /// Per-item results in loop order (empty for tasks without a loop)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ActionResult>,
}

impl TaskResult {
    pub fn single(result: ActionResult) -> Self {
        TaskResult {
            result,
            items: Vec::new(),
        }
    }

    /// Aggregate loop results
    ///
    /// Succeeds only if every item succeeded; changed if any item changed.
    /// Exit code and error come from the first failing item, otherwise the
    /// exit code is the last item's.
    pub fn aggregate(items: Vec<ActionResult>) -> Self {
        let first_failure = items.iter().find(|item| !item.succeeded);

        let result = ActionResult {
            succeeded: first_failure.is_none(),
            output: items
                .iter()
                .map(|item| item.output.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            exit_code: first_failure
                .or(items.last())
                .and_then(|item| item.exit_code),
            changed: items.iter().any(|item| item.changed),
            error: first_failure.and_then(|item| item.error),
        };

        TaskResult { result, items }
    }

    pub fn succeeded(&self) -> bool {
        self.result.succeeded
    }

    pub fn error(&self) -> Option<ErrorKind> {
        self.result.error
    }
}

/// Lookup of a name that no task has registered in this run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{0}' has not been registered in this run")]
pub struct UnresolvedReference(pub String);

/// Mapping from registration name to task result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Registry {
    entries: BTreeMap<String, TaskResult>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a result, returning the entry it replaced
    pub fn put(&mut self, name: impl Into<String>, result: TaskResult) -> Option<TaskResult> {
        self.entries.insert(name.into(), result)
    }

    pub fn get(&self, name: &str) -> Result<&TaskResult, UnresolvedReference> {
        self.entries
            .get(name)
            .ok_or_else(|| UnresolvedReference(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskResult)> {
        self.entries.iter().map(|(name, result)| (name.as_str(), result))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let mut registry = Registry::new();
        assert!(!registry.has("output"));

        let previous = registry.put("output", TaskResult::single(ActionResult::ok("v1")));
        assert!(previous.is_none());
        assert!(registry.has("output"));
        assert_eq!(registry.get("output").unwrap().result.output, "v1");
    }

    #[test]
    fn test_last_write_wins_and_is_reported() {
        let mut registry = Registry::new();
        registry.put("output", TaskResult::single(ActionResult::ok("v1")));

        let previous = registry.put("output", TaskResult::single(ActionResult::ok("v2")));

        assert_eq!(previous.unwrap().result.output, "v1");
        assert_eq!(registry.get("output").unwrap().result.output, "v2");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_missing_is_unresolved() {
        let registry = Registry::new();
        assert_eq!(
            registry.get("ghost"),
            Err(UnresolvedReference("ghost".to_string()))
        );
    }

    #[test]
    fn test_aggregate_all_succeeded() {
        let aggregate = TaskResult::aggregate(vec![
            ActionResult::changed("a installed"),
            ActionResult::ok("b already latest"),
        ]);

        assert!(aggregate.succeeded());
        assert!(aggregate.result.changed);
        assert_eq!(aggregate.result.output, "a installed\nb already latest");
        assert_eq!(aggregate.items.len(), 2);
    }

    #[test]
    fn test_aggregate_takes_first_failure() {
        let aggregate = TaskResult::aggregate(vec![
            ActionResult::ok("fine").with_exit_code(Some(0)),
            ActionResult::failed(ErrorKind::Timeout, "slow"),
            ActionResult::failed(ErrorKind::ActionFailure, "broken").with_exit_code(Some(2)),
        ]);

        assert!(!aggregate.succeeded());
        assert_eq!(aggregate.error(), Some(ErrorKind::Timeout));
        assert_eq!(aggregate.result.exit_code, None);
    }

    #[test]
    fn test_aggregate_exit_code_of_last_item() {
        let aggregate = TaskResult::aggregate(vec![
            ActionResult::ok("a").with_exit_code(Some(0)),
            ActionResult::ok("b").with_exit_code(Some(0)),
        ]);
        assert_eq!(aggregate.result.exit_code, Some(0));
    }

    #[test]
    fn test_names_are_sorted() {
        let mut registry = Registry::new();
        registry.put("b", TaskResult::single(ActionResult::ok("")));
        registry.put("a", TaskResult::single(ActionResult::ok("")));

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
