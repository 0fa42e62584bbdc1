//! Runtime task representation
//!
//! These differ from `config::TaskDef` by carrying typed actions, parsed
//! conditions and resolved timeouts. They are built by
//! [`Plan::from_config`](crate::runner::Plan::from_config).

use crate::config::TaskDef;
use crate::runner::{Action, FailurePolicy, Predicate};
use std::time::Duration;

/// A single task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Task name, unique within the plan
    pub name: String,

    /// Work to perform
    pub action: Action,

    /// Registry name for the result
    pub register: Option<String>,

    /// Gate evaluated right before the task would run
    pub when: Option<Predicate>,

    /// What a failure means
    pub policy: FailurePolicy,

    /// Loop values; the action runs once per item, `None` runs it once
    pub loop_items: Option<Vec<String>>,

    /// Timeout overriding the run default
    pub timeout: Option<Duration>,
}

impl Task {
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Task {
            name: name.into(),
            action,
            register: None,
            when: None,
            policy: FailurePolicy::Abort,
            loop_items: None,
            timeout: None,
        }
    }

    pub fn register(mut self, name: impl Into<String>) -> Self {
        self.register = Some(name.into());
        self
    }

    pub fn when(mut self, predicate: Predicate) -> Self {
        self.when = Some(predicate);
        self
    }

    pub fn ignore_errors(mut self) -> Self {
        self.policy = FailurePolicy::Ignore;
        self
    }

    pub fn with_loop<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.loop_items = Some(items.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Convert back to the plan file form
    pub fn to_config(&self) -> TaskDef {
        let mut def = TaskDef {
            name: Some(self.name.clone()),
            when: self.when.as_ref().map(ToString::to_string),
            register: self.register.clone(),
            ignore_errors: self.policy.ignores_errors(),
            loop_items: self.loop_items.clone(),
            timeout: self.timeout.map(format_duration),
            ..Default::default()
        };
        self.action.write_config(&mut def);
        def
    }
}

/// A block/rescue/always group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskGroup {
    pub name: Option<String>,

    /// Gate for the whole group
    pub when: Option<Predicate>,

    pub block: Vec<Step>,
    pub rescue: Vec<Step>,
    pub always: Vec<Step>,
}

impl TaskGroup {
    pub fn new(block: Vec<Step>) -> Self {
        TaskGroup {
            block,
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn rescue(mut self, steps: Vec<Step>) -> Self {
        self.rescue = steps;
        self
    }

    pub fn always(mut self, steps: Vec<Step>) -> Self {
        self.always = steps;
        self
    }

    pub fn when(mut self, predicate: Predicate) -> Self {
        self.when = Some(predicate);
        self
    }

    /// Label used in logs
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<block>")
    }

    /// Every task in the group, in plan order
    pub fn tasks(&self) -> Vec<&Task> {
        let mut tasks = Vec::new();
        for step in self.block.iter().chain(&self.rescue).chain(&self.always) {
            step.collect_tasks(&mut tasks);
        }
        tasks
    }

    /// Convert back to the plan file form
    pub fn to_config(&self) -> TaskDef {
        TaskDef {
            name: self.name.clone(),
            when: self.when.as_ref().map(ToString::to_string),
            block: Some(self.block.iter().map(Step::to_config).collect()),
            rescue: self.rescue.iter().map(Step::to_config).collect(),
            always: self.always.iter().map(Step::to_config).collect(),
            ..Default::default()
        }
    }
}

/// One entry of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Task(Task),
    Group(TaskGroup),
}

impl Step {
    pub fn to_config(&self) -> TaskDef {
        match self {
            Step::Task(task) => task.to_config(),
            Step::Group(group) => group.to_config(),
        }
    }

    /// Every task in this step, in plan order (block, rescue, always)
    pub fn tasks(&self) -> Vec<&Task> {
        let mut tasks = Vec::new();
        self.collect_tasks(&mut tasks);
        tasks
    }

    fn collect_tasks<'a>(&'a self, tasks: &mut Vec<&'a Task>) {
        match self {
            Step::Task(task) => tasks.push(task),
            Step::Group(group) => tasks.extend(group.tasks()),
        }
    }
}

impl From<Task> for Step {
    fn from(task: Task) -> Self {
        Step::Task(task)
    }
}

impl From<TaskGroup> for Step {
    fn from(group: TaskGroup) -> Self {
        Step::Group(group)
    }
}

/// Format a duration so `config::parse_duration` reads it back exactly
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms % 3_600_000 == 0 {
        format!("{}h", ms / 3_600_000)
    } else if ms % 60_000 == 0 {
        format!("{}m", ms / 60_000)
    } else if ms % 1_000 == 0 {
        format!("{}s", ms / 1_000)
    } else {
        format!("{}ms", ms)
    }
}
