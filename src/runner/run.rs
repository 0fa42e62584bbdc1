//! Plan execution
//!
//! [`Runner`] walks a [`Plan`] strictly in order against one target. It owns
//! the registry for the run, gates every task on its condition, applies the
//! failure policy and resolves block/rescue/always groups.

use crate::error::ErrorKind;
use crate::runner::task::format_duration;
use crate::runner::{
    evaluate, judge, resolve_group, AbortCause, Action, ActionResult, Context, Deadline, Executor,
    Flow, Plan, Predicate, Registry, RunOutcome, RunState, SkipReason, Step, Task, TaskGroup,
    TaskRecord, TaskResult, TaskStatus, UnresolvedReference, Verdict,
};
use tracing::{debug, error, info, info_span, warn};

/// Executes one plan against one target
pub struct Runner<'a> {
    target: &'a mut dyn Executor,
    ctx: Context,
    registry: Registry,
    records: Vec<TaskRecord>,
    state: RunState,
}

impl<'a> Runner<'a> {
    pub fn new(target: &'a mut dyn Executor, ctx: Context) -> Self {
        Runner {
            target,
            ctx,
            registry: Registry::new(),
            records: Vec::new(),
            state: RunState::Pending,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run every step of the plan and return the outcome
    pub fn run(mut self, plan: &Plan) -> RunOutcome {
        self.state = RunState::Running;
        info!(
            plan = plan.name().unwrap_or("<unnamed>"),
            tasks = plan.tasks().len(),
            "starting run"
        );

        let flow = self.run_steps(plan.steps());

        let (abort_reason, aborted_by) = match flow {
            Flow::Continue => {
                info!(tasks = self.records.len(), "run completed");
                (None, None)
            }
            Flow::Failed(cause) => {
                error!(task = %cause.task, error = %cause.kind, "run aborted");
                (Some(ErrorKind::AbortedRun), Some(cause))
            }
            Flow::Cancelled => {
                warn!("run cancelled");
                (Some(ErrorKind::Cancelled), None)
            }
        };

        self.state = if abort_reason.is_some() {
            RunState::Aborted
        } else {
            RunState::Completed
        };

        RunOutcome {
            plan: plan.name().map(str::to_string),
            state: self.state,
            tasks: self.records,
            aborted: abort_reason.is_some(),
            abort_reason,
            aborted_by,
            registry: self.registry,
        }
    }

    fn run_steps(&mut self, steps: &[Step]) -> Flow {
        for step in steps {
            if self.ctx.is_cancelled() {
                info!("cancellation requested, no further tasks will start");
                return Flow::Cancelled;
            }

            let flow = match step {
                Step::Task(task) => self.run_task(task),
                Step::Group(group) => self.run_group(group),
            };
            if !flow.is_continue() {
                return flow;
            }
        }
        Flow::Continue
    }

    fn run_task(&mut self, task: &Task) -> Flow {
        let span = info_span!("task", name = %task.name);
        let _enter = span.enter();

        if let Some(predicate) = &task.when {
            if let Some((reason, unresolved)) = self.gate(predicate) {
                self.records
                    .push(TaskRecord::skipped(&task.name, reason, unresolved));
                return Flow::Continue;
            }
        }

        info!(action = %task.action.describe(), "running");
        let deadline = Deadline::new(
            self.ctx.timeout_for(task.timeout),
            self.ctx.cancellation.clone(),
        );

        let task_result = match &task.loop_items {
            None => TaskResult::single(self.execute(&task.action, &deadline)),
            Some(loop_items) => {
                let mut items = Vec::with_capacity(loop_items.len());
                for item in loop_items {
                    debug!(item = %item, "loop item");
                    let result = self.execute(&task.action.with_item(item), &deadline);
                    let cancelled = result.error == Some(ErrorKind::Cancelled);
                    items.push(result);
                    if cancelled {
                        break;
                    }
                }
                TaskResult::aggregate(items)
            }
        };

        let overwrote = match &task.register {
            Some(name) => {
                let previous = self.registry.put(name.clone(), task_result.clone());
                if previous.is_some() {
                    warn!(register = %name, "overwriting previously registered result");
                }
                previous.is_some()
            }
            None => false,
        };

        let TaskResult { result, items } = task_result;
        let (status, flow) = if result.error == Some(ErrorKind::Cancelled) {
            warn!("interrupted by cancellation");
            (TaskStatus::Failed, Flow::Cancelled)
        } else {
            match judge(task.policy, &result) {
                Verdict::Passed => {
                    info!(changed = result.changed, "completed");
                    (TaskStatus::Completed, Flow::Continue)
                }
                Verdict::Suppressed(kind) => {
                    warn!(error = %kind, output = %result.output, "failed, ignoring");
                    (TaskStatus::Ignored, Flow::Continue)
                }
                Verdict::Escalate(kind) => {
                    error!(error = %kind, output = %result.output, "failed");
                    (
                        TaskStatus::Failed,
                        Flow::Failed(AbortCause {
                            task: task.name.clone(),
                            kind,
                        }),
                    )
                }
            }
        };

        self.records.push(TaskRecord {
            name: task.name.clone(),
            status,
            skip_reason: None,
            unresolved: None,
            result: Some(result),
            items,
            overwrote,
        });
        flow
    }

    fn run_group(&mut self, group: &TaskGroup) -> Flow {
        let span = info_span!("group", name = %group.label());
        let _enter = span.enter();

        if let Some(predicate) = &group.when {
            if let Some((reason, unresolved)) = self.gate(predicate) {
                for task in group.tasks() {
                    self.records
                        .push(TaskRecord::skipped(&task.name, reason, unresolved.clone()));
                }
                return Flow::Continue;
            }
        }

        let mark = self.records.len();
        let block = self.run_steps(&group.block);

        let rescue = match &block {
            Flow::Failed(cause) if !group.rescue.is_empty() => {
                info!(task = %cause.task, "block failed, running rescue");
                let flow = self.run_steps(&group.rescue);
                if flow.is_continue() {
                    self.mark_rescued(mark, &cause.task);
                }
                Some(flow)
            }
            _ => None,
        };

        let always = self.run_steps(&group.always);

        let flow = resolve_group(block, rescue, always);
        if let Flow::Failed(cause) = &flow {
            debug!(task = %cause.task, "group failed");
        }
        flow
    }

    /// Evaluate a condition; `Some` means the gated work is skipped
    fn gate(&self, predicate: &Predicate) -> Option<(SkipReason, Option<String>)> {
        match evaluate(predicate, &self.registry) {
            Ok(true) => {
                debug!(when = %predicate, "condition true");
                None
            }
            Ok(false) => {
                info!(when = %predicate, "skipped, condition false");
                Some((SkipReason::Condition, None))
            }
            Err(UnresolvedReference(name)) => {
                warn!(when = %predicate, reference = %name, "skipped, condition reads an unregistered result");
                Some((SkipReason::Unresolved, Some(name)))
            }
        }
    }

    fn execute(&mut self, action: &Action, deadline: &Deadline) -> ActionResult {
        if deadline.is_cancelled() {
            return ActionResult::failed(ErrorKind::Cancelled, "cancelled before start");
        }
        if deadline.expired() {
            return timed_out(deadline, String::new(), false);
        }

        let result = action.execute(&mut *self.target, deadline);

        if result.succeeded && deadline.expired() {
            debug!(elapsed = ?deadline.elapsed(), "action returned after its deadline");
            return timed_out(deadline, result.output, result.changed)
                .with_exit_code(result.exit_code);
        }
        result
    }

    fn mark_rescued(&mut self, from: usize, task: &str) {
        if let Some(record) = self.records[from..]
            .iter_mut()
            .find(|record| record.name == task && record.status == TaskStatus::Failed)
        {
            record.status = TaskStatus::Rescued;
        }
    }
}

fn timed_out(deadline: &Deadline, output: String, changed: bool) -> ActionResult {
    let limit = deadline.timeout().map(format_duration).unwrap_or_default();
    let output = if output.is_empty() {
        format!("timed out after {}", limit)
    } else {
        output
    };

    ActionResult {
        changed,
        ..ActionResult::failed(ErrorKind::Timeout, output)
    }
}

/// Run a plan against a target with the given context
pub fn run_plan(plan: &Plan, target: &mut dyn Executor, ctx: Context) -> RunOutcome {
    Runner::new(target, ctx).run(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::FakeTarget;
    use std::time::Duration;

    fn probe(name: &str, command: &str) -> Task {
        Task::new(name, Action::Probe {
            command: command.to_string(),
        })
    }

    fn plan(steps: Vec<Step>) -> Plan {
        Plan::new(steps).unwrap()
    }

    #[test]
    fn test_runner_completes() {
        let plan = plan(vec![probe("hello", "echo hi").register("hello").into()]);
        let mut target = FakeTarget::new().with_command("echo hi", 0, "hi\n");

        let runner = Runner::new(&mut target, Context::new());
        assert_eq!(runner.state(), RunState::Pending);
        let outcome = runner.run(&plan);

        assert_eq!(outcome.state, RunState::Completed);
        assert!(!outcome.aborted);
        assert_eq!(outcome.status_of("hello"), Some(TaskStatus::Completed));
        assert_eq!(outcome.registry.get("hello").unwrap().result.output, "hi");
    }

    #[test]
    fn test_failure_aborts_and_names_task() {
        let plan = plan(vec![
            probe("check", "missing").into(),
            probe("after", "echo hi").into(),
        ]);
        let mut target = FakeTarget::new();

        let outcome = run_plan(&plan, &mut target, Context::new());

        assert_eq!(outcome.state, RunState::Aborted);
        assert_eq!(outcome.abort_reason, Some(ErrorKind::AbortedRun));
        assert_eq!(
            outcome.aborted_by,
            Some(AbortCause {
                task: "check".to_string(),
                kind: ErrorKind::ActionFailure,
            })
        );
        assert!(outcome.record("after").is_none());
    }

    #[test]
    fn test_ignored_failure_continues() {
        let plan = plan(vec![
            probe("check", "missing").ignore_errors().into(),
            probe("after", "echo hi").into(),
        ]);
        let mut target = FakeTarget::new().with_command("echo hi", 0, "hi");

        let outcome = run_plan(&plan, &mut target, Context::new());

        assert!(!outcome.aborted);
        assert_eq!(outcome.status_of("check"), Some(TaskStatus::Ignored));
        assert_eq!(outcome.trace(), vec!["check", "after"]);
    }

    #[test]
    fn test_skipped_task_does_not_register() {
        let plan = plan(vec![
            probe("check", "echo hi").register("check").into(),
            probe("never", "echo again")
                .register("never")
                .when(Predicate::parse("check.failed").unwrap())
                .into(),
        ]);
        let mut target = FakeTarget::new().with_command("echo hi", 0, "hi");

        let outcome = run_plan(&plan, &mut target, Context::new());

        let record = outcome.record("never").unwrap();
        assert_eq!(record.status, TaskStatus::Skipped);
        assert_eq!(record.skip_reason, Some(SkipReason::Condition));
        assert!(!outcome.registry.has("never"));
    }

    #[test]
    fn test_rescued_block_marks_task() {
        let group = TaskGroup::new(vec![probe("main", "missing").into()])
            .rescue(vec![probe("fix", "echo fix").into()]);
        let plan = plan(vec![group.into()]);
        let mut target = FakeTarget::new().with_command("echo fix", 0, "fix");

        let outcome = run_plan(&plan, &mut target, Context::new());

        assert!(!outcome.aborted);
        assert_eq!(outcome.status_of("main"), Some(TaskStatus::Rescued));
        assert_eq!(outcome.status_of("fix"), Some(TaskStatus::Completed));
    }

    #[test]
    fn test_post_deadline_success_is_timeout() {
        let plan = plan(vec![probe("slow", "echo hi")
            .with_timeout(Duration::from_millis(10))
            .into()]);
        let mut target = FakeTarget::new()
            .with_command("echo hi", 0, "hi")
            .with_delay(Duration::from_millis(50))
            .ignoring_deadline();

        let outcome = run_plan(&plan, &mut target, Context::new());

        let result = outcome.record("slow").unwrap().result.clone().unwrap();
        assert!(!result.succeeded);
        assert_eq!(result.error, Some(ErrorKind::Timeout));
        assert_eq!(outcome.aborted_by.unwrap().kind, ErrorKind::Timeout);
    }
}
