//! Validated, ordered plan
//!
//! A [`Plan`] is built once, checked once, and never changes while it runs.
//! Every check that can fail without touching the target happens here:
//! unique task names, well-formed conditions, and conditions that only read
//! names registered by an earlier task.

use crate::config::{parse_duration, validate_plan, PackageManager, PlanFile, TaskDef};
use crate::error::{ConfigError, PlanError, PlanResult, RplayError};
use crate::runner::task::format_duration;
use crate::runner::{
    has_item_placeholder, is_valid_name, Action, FailurePolicy, Predicate, Step, Task, TaskGroup,
};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

/// Plan-wide settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSettings {
    pub interpreter: Option<Vec<String>>,
    pub package_manager: PackageManager,
    /// Default per-task timeout
    pub timeout: Option<Duration>,
}

/// An ordered, validated list of steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    name: Option<String>,
    settings: PlanSettings,
    steps: Vec<Step>,
    overwritten: Vec<String>,
}

impl Plan {
    /// Build and validate a plan from steps
    pub fn new(steps: Vec<Step>) -> PlanResult<Self> {
        Self::with_settings(None, PlanSettings::default(), steps)
    }

    /// Build and validate a named plan with settings
    pub fn with_settings(
        name: Option<String>,
        settings: PlanSettings,
        steps: Vec<Step>,
    ) -> PlanResult<Self> {
        if steps.iter().all(|step| step.tasks().is_empty()) {
            return Err(PlanError::EmptyPlan);
        }

        let mut checker = Checker::default();
        checker.check_steps(&steps)?;

        Ok(Plan {
            name,
            settings,
            steps,
            overwritten: checker.overwritten,
        })
    }

    /// Build a runtime plan from a parsed plan file
    pub fn from_config(file: &PlanFile) -> Result<Self, RplayError> {
        validate_plan(file)?;

        let settings = PlanSettings {
            interpreter: file.interpreter.clone(),
            package_manager: file.package_manager.unwrap_or_default(),
            timeout: file.timeout.as_deref().map(parse_duration).transpose()?,
        };

        let steps = file
            .tasks
            .iter()
            .map(step_from_config)
            .collect::<Result<Vec<_>, RplayError>>()?;

        Ok(Self::with_settings(file.name.clone(), settings, steps)?)
    }

    /// Convert back to the plan file form
    pub fn to_config(&self) -> PlanFile {
        PlanFile {
            name: self.name.clone(),
            interpreter: self.settings.interpreter.clone(),
            package_manager: Some(self.settings.package_manager),
            timeout: self.settings.timeout.map(format_duration),
            tasks: self.steps.iter().map(Step::to_config).collect(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn settings(&self) -> &PlanSettings {
        &self.settings
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Every task in plan order, groups flattened
    pub fn tasks(&self) -> Vec<&Task> {
        self.steps.iter().flat_map(Step::tasks).collect()
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks().into_iter().find(|task| task.name == name)
    }

    /// Registration names that more than one task writes, once per repeat
    pub fn overwritten_registrations(&self) -> &[String] {
        &self.overwritten
    }
}

/// Walks steps in execution order, tracking names seen so far
#[derive(Default)]
struct Checker {
    names: HashSet<String>,
    registered: HashSet<String>,
    overwritten: Vec<String>,
}

impl Checker {
    fn check_steps(&mut self, steps: &[Step]) -> PlanResult<()> {
        for step in steps {
            match step {
                Step::Task(task) => self.check_task(task)?,
                Step::Group(group) => self.check_group(group)?,
            }
        }
        Ok(())
    }

    fn claim_name(&mut self, name: &str) -> PlanResult<()> {
        if !self.names.insert(name.to_string()) {
            return Err(PlanError::DuplicateTaskName(name.to_string()));
        }
        Ok(())
    }

    fn check_references(&self, owner: &str, predicate: Option<&Predicate>) -> PlanResult<()> {
        let Some(predicate) = predicate else {
            return Ok(());
        };

        match predicate
            .references()
            .into_iter()
            .find(|name| !self.registered.contains(*name))
        {
            Some(name) => Err(PlanError::UnknownReference {
                task: owner.to_string(),
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn check_task(&mut self, task: &Task) -> PlanResult<()> {
        self.claim_name(&task.name)?;
        self.check_references(&task.name, task.when.as_ref())?;

        if task.loop_items.is_none()
            && task
                .action
                .parameters()
                .iter()
                .any(|param| has_item_placeholder(param))
        {
            warn!(task = %task.name, "'{{{{ item }}}}' used without a loop; it will not be substituted");
        }

        if let Some(register) = &task.register {
            if !is_valid_name(register) {
                return Err(PlanError::InvalidRegisterName {
                    task: task.name.clone(),
                    name: register.clone(),
                });
            }
            if !self.registered.insert(register.clone()) {
                warn!(task = %task.name, register = %register, "registration overwrites an earlier result");
                self.overwritten.push(register.clone());
            }
        }

        Ok(())
    }

    fn check_group(&mut self, group: &TaskGroup) -> PlanResult<()> {
        if let Some(name) = &group.name {
            self.claim_name(name)?;
        }
        self.check_references(group.label(), group.when.as_ref())?;

        self.check_steps(&group.block)?;
        self.check_steps(&group.rescue)?;
        self.check_steps(&group.always)
    }
}

fn parse_when(owner: &str, when: Option<&String>) -> PlanResult<Option<Predicate>> {
    when.map(|expr| {
        Predicate::parse(expr).map_err(|error| PlanError::InvalidPredicate {
            task: owner.to_string(),
            error,
        })
    })
    .transpose()
}

fn step_from_config(def: &TaskDef) -> Result<Step, RplayError> {
    let when = parse_when(def.label(), def.when.as_ref())?;

    if let Some(block) = &def.block {
        let convert = |defs: &[TaskDef]| {
            defs.iter()
                .map(step_from_config)
                .collect::<Result<Vec<_>, RplayError>>()
        };

        return Ok(Step::Group(TaskGroup {
            name: def.name.clone(),
            when,
            block: convert(block.as_slice())?,
            rescue: convert(def.rescue.as_slice())?,
            always: convert(def.always.as_slice())?,
        }));
    }

    let action =
        Action::from_config(def).ok_or_else(|| ConfigError::AmbiguousEntry(def.label().to_string()))?;

    Ok(Step::Task(Task {
        name: def.label().to_string(),
        action,
        register: def.register.clone(),
        when,
        policy: FailurePolicy::from_ignore_errors(def.ignore_errors),
        loop_items: def.loop_items.clone(),
        timeout: def.timeout.as_deref().map(parse_duration).transpose()?,
    }))
}
