//! Target capability
//!
//! Actions never talk to a host directly. They go through an [`Executor`],
//! which the calling environment injects. The crate ships
//! [`LocalExecutor`](crate::runner::LocalExecutor) for the local host and
//! [`FakeTarget`](crate::runner::FakeTarget) for tests.

use crate::error::TransportResult;
use crate::runner::Cancellation;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Captured result of a command run on the target
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Installation state of a package on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageState {
    Absent,
    Installed,
    /// Installed with a newer version available
    Outdated,
}

/// Time and cancellation bounds for one task
#[derive(Debug, Clone)]
pub struct Deadline {
    timeout: Option<Duration>,
    started: Instant,
    cancellation: Cancellation,
}

impl Deadline {
    pub fn new(timeout: Option<Duration>, cancellation: Cancellation) -> Self {
        Self {
            timeout,
            started: Instant::now(),
            cancellation,
        }
    }

    /// A deadline that never expires and cannot be cancelled
    pub fn unbounded() -> Self {
        Self::new(None, Cancellation::new())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.timeout
            .map(|timeout| timeout.saturating_sub(self.started.elapsed()))
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Remote command and package capability of a target
///
/// Implementations must honor the deadline: return
/// [`TransportError::Timeout`](crate::error::TransportError::Timeout) once it
/// expires. Whether an in-flight operation stops on cancellation is up to the
/// implementation and must be documented on it.
pub trait Executor {
    /// Run a command and capture its output
    fn run_command(&mut self, command: &str, deadline: &Deadline)
        -> TransportResult<CommandOutput>;

    /// Query the installation state of a package
    fn package_state(&mut self, name: &str, deadline: &Deadline) -> TransportResult<PackageState>;

    /// Install a package that is absent
    fn install_package(&mut self, name: &str, deadline: &Deadline) -> TransportResult<()>;

    /// Upgrade an installed package to the newest version
    fn upgrade_package(&mut self, name: &str, deadline: &Deadline) -> TransportResult<()>;

    /// Refresh the package index, returning whether it changed
    fn update_cache(&mut self, deadline: &Deadline) -> TransportResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_unbounded_deadline() {
        let deadline = Deadline::unbounded();
        assert_eq!(deadline.remaining(), None);
        assert!(!deadline.expired());
        assert!(!deadline.is_cancelled());
    }

    #[test]
    fn test_deadline_expires() {
        let deadline = Deadline::new(Some(Duration::from_millis(10)), Cancellation::new());
        thread::sleep(Duration::from_millis(20));
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_deadline_sees_cancellation() {
        let token = Cancellation::new();
        let deadline = Deadline::new(None, token.clone());
        token.cancel();
        assert!(deadline.is_cancelled());
    }

    #[test]
    fn test_command_output_success() {
        assert!(CommandOutput::new(0, "ok", "").success());
        assert!(!CommandOutput::new(127, "", "not found").success());
        assert!(!CommandOutput::default().success());
    }
}
