//! In-memory target for tests and examples.

use crate::error::{TransportError, TransportResult};
use crate::runner::{CommandOutput, Deadline, Executor, PackageState};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::thread;
use std::time::Duration;

/// A simulated host with a package database and canned command results
///
/// Every call is appended to [`FakeTarget::operations`], so tests can assert
/// both outcomes and the exact order of target interactions.
#[derive(Debug, Clone, Default)]
pub struct FakeTarget {
    installed: BTreeMap<String, PackageState>,
    available: BTreeSet<String>,
    commands: HashMap<String, CommandOutput>,
    cache_stale: bool,
    delay: Option<Duration>,
    honor_deadline: bool,
    operations: Vec<String>,
}

impl FakeTarget {
    pub fn new() -> Self {
        FakeTarget {
            honor_deadline: true,
            ..Default::default()
        }
    }

    /// Make a package installable
    pub fn with_available(mut self, name: &str) -> Self {
        self.available.insert(name.to_string());
        self
    }

    /// Mark a package installed and current
    pub fn with_installed(mut self, name: &str) -> Self {
        self.available.insert(name.to_string());
        self.installed
            .insert(name.to_string(), PackageState::Installed);
        self
    }

    /// Mark a package installed with an upgrade pending
    pub fn with_outdated(mut self, name: &str) -> Self {
        self.available.insert(name.to_string());
        self.installed.insert(name.to_string(), PackageState::Outdated);
        self
    }

    /// Register the result of a command; unknown commands exit 127
    pub fn with_command(mut self, command: &str, exit_code: i32, stdout: &str) -> Self {
        self.commands
            .insert(command.to_string(), CommandOutput::new(exit_code, stdout, ""));
        self
    }

    /// The next cache refresh reports a change
    pub fn with_stale_cache(mut self) -> Self {
        self.cache_stale = true;
        self
    }

    /// Every operation takes this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep the full delay even past the deadline, like a target that cannot be interrupted
    pub fn ignoring_deadline(mut self) -> Self {
        self.honor_deadline = false;
        self
    }

    /// Log of every call made against this target
    pub fn operations(&self) -> &[String] {
        &self.operations
    }

    pub fn package_state_of(&self, name: &str) -> PackageState {
        self.installed
            .get(name)
            .copied()
            .unwrap_or(PackageState::Absent)
    }

    fn enter(&mut self, operation: String, deadline: &Deadline) -> TransportResult<()> {
        self.operations.push(operation);

        let Some(delay) = self.delay else {
            return Ok(());
        };

        match deadline.remaining() {
            Some(left) if self.honor_deadline && left < delay => {
                thread::sleep(left);
                Err(TransportError::Timeout(deadline.timeout().unwrap_or_default()))
            }
            _ => {
                thread::sleep(delay);
                Ok(())
            }
        }
    }
}

impl Executor for FakeTarget {
    fn run_command(
        &mut self,
        command: &str,
        deadline: &Deadline,
    ) -> TransportResult<CommandOutput> {
        self.enter(format!("run {}", command), deadline)?;

        Ok(self.commands.get(command).cloned().unwrap_or_else(|| {
            let program = command.split_whitespace().next().unwrap_or_default();
            CommandOutput::new(127, "", format!("{}: command not found", program))
        }))
    }

    fn package_state(&mut self, name: &str, deadline: &Deadline) -> TransportResult<PackageState> {
        self.enter(format!("query {}", name), deadline)?;
        Ok(self.package_state_of(name))
    }

    fn install_package(&mut self, name: &str, deadline: &Deadline) -> TransportResult<()> {
        self.enter(format!("install {}", name), deadline)?;

        if !self.available.contains(name) {
            return Err(TransportError::Backend(format!(
                "Unable to locate package {}",
                name
            )));
        }
        self.installed
            .insert(name.to_string(), PackageState::Installed);
        Ok(())
    }

    fn upgrade_package(&mut self, name: &str, deadline: &Deadline) -> TransportResult<()> {
        self.enter(format!("upgrade {}", name), deadline)?;

        match self.installed.get_mut(name) {
            Some(state) => {
                *state = PackageState::Installed;
                Ok(())
            }
            None => Err(TransportError::Backend(format!(
                "Package {} is not installed",
                name
            ))),
        }
    }

    fn update_cache(&mut self, deadline: &Deadline) -> TransportResult<bool> {
        self.enter("update-cache".to_string(), deadline)?;
        Ok(std::mem::take(&mut self.cache_stale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Cancellation;

    #[test]
    fn test_install_available_package() {
        let mut target = FakeTarget::new().with_available("curl");
        let deadline = Deadline::unbounded();

        assert_eq!(
            target.package_state("curl", &deadline).unwrap(),
            PackageState::Absent
        );
        target.install_package("curl", &deadline).unwrap();
        assert_eq!(target.package_state_of("curl"), PackageState::Installed);
    }

    #[test]
    fn test_install_unknown_package_fails() {
        let mut target = FakeTarget::new();
        let result = target.install_package("nope", &Deadline::unbounded());
        assert!(matches!(result, Err(TransportError::Backend(_))));
    }

    #[test]
    fn test_unknown_command_exits_127() {
        let mut target = FakeTarget::new();
        let output = target
            .run_command("docker --version", &Deadline::unbounded())
            .unwrap();

        assert_eq!(output.exit_code, Some(127));
        assert_eq!(output.stderr, "docker: command not found");
    }

    #[test]
    fn test_stale_cache_changes_once() {
        let mut target = FakeTarget::new().with_stale_cache();
        let deadline = Deadline::unbounded();

        assert!(target.update_cache(&deadline).unwrap());
        assert!(!target.update_cache(&deadline).unwrap());
    }

    #[test]
    fn test_delay_past_deadline_times_out() {
        let mut target = FakeTarget::new().with_delay(Duration::from_millis(200));
        let deadline = Deadline::new(Some(Duration::from_millis(20)), Cancellation::new());

        let result = target.run_command("true", &deadline);
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[test]
    fn test_operations_are_logged_in_order() {
        let mut target = FakeTarget::new().with_installed("git");
        let deadline = Deadline::unbounded();

        target.package_state("git", &deadline).unwrap();
        target.run_command("git --version", &deadline).unwrap();

        assert_eq!(target.operations(), &["query git", "run git --version"]);
    }
}
