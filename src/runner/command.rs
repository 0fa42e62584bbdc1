//! Local command execution
//!
//! [`LocalExecutor`] runs commands on the local host through an interpreter
//! (`sh -c` by default) and drives the system package manager through a
//! [`PackageBackend`] command set.
//!
//! Interruption safety: probes and package queries are killed when the
//! deadline expires or the run is cancelled. Package installs, upgrades and
//! index refreshes are killed only on timeout; on cancellation they run to
//! completion so the package database is never left half-written by us.

use crate::config::PackageManager;
use crate::error::{TransportError, TransportResult};
use crate::runner::{CommandOutput, Deadline, Executor, PackageState};
use std::io::Read;
use std::process::{Child, Command as StdCommand, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};
use wait_timeout::ChildExt;

/// How often a running child is checked for deadline and cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shell command templates for one package manager; `{name}` is replaced by the quoted package name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageBackend {
    /// Exit 0 when the package is installed
    pub query_installed: &'static str,
    /// Exit 0 when an upgrade is available
    pub query_outdated: &'static str,
    pub install: &'static str,
    pub upgrade: &'static str,
    pub update_cache: &'static str,
    /// Prints a value that changes whenever the package index changes
    pub cache_stamp: &'static str,
}

impl PackageBackend {
    pub fn for_manager(manager: PackageManager) -> Self {
        match manager {
            PackageManager::Apt => PackageBackend {
                query_installed:
                    "dpkg-query -W -f='${Status}' {name} 2>/dev/null | grep -q 'install ok installed'",
                query_outdated:
                    "apt list --upgradable 2>/dev/null | cut -d/ -f1 | grep -qxF -- {name}",
                install: "DEBIAN_FRONTEND=noninteractive apt-get install -y -q {name}",
                upgrade: "DEBIAN_FRONTEND=noninteractive apt-get install -y -q --only-upgrade {name}",
                update_cache: "apt-get update -q",
                cache_stamp: "ls -l --time-style=+%s /var/lib/apt/lists 2>/dev/null | md5sum",
            },
            PackageManager::Dnf => PackageBackend {
                query_installed: "rpm -q {name} >/dev/null 2>&1",
                query_outdated: "dnf -q check-update {name} >/dev/null 2>&1; test $? -eq 100",
                install: "dnf install -y -q {name}",
                upgrade: "dnf upgrade -y -q {name}",
                update_cache: "dnf makecache -q",
                cache_stamp: "ls -l --time-style=+%s /var/cache/dnf 2>/dev/null | md5sum",
            },
            PackageManager::Pacman => PackageBackend {
                query_installed: "pacman -Qi {name} >/dev/null 2>&1",
                query_outdated: "pacman -Qu {name} >/dev/null 2>&1",
                install: "pacman -S --noconfirm --needed {name}",
                upgrade: "pacman -S --noconfirm {name}",
                update_cache: "pacman -Sy --noconfirm",
                cache_stamp: "ls -l --time-style=+%s /var/lib/pacman/sync 2>/dev/null | md5sum",
            },
        }
    }

    fn render(template: &str, name: &str) -> String {
        template.replace("{name}", &shell_quote(name))
    }
}

impl Default for PackageBackend {
    fn default() -> Self {
        Self::for_manager(PackageManager::default())
    }
}

/// Quote a value for safe use as a single POSIX shell word
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Executor for the local host
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    /// Interpreter prefix (e.g., ["sh", "-c"])
    pub interpreter: Vec<String>,

    /// Package manager command set
    pub backend: PackageBackend,

    /// Extra environment for every spawned command
    pub env: Vec<(String, String)>,
}

impl LocalExecutor {
    pub fn new() -> Self {
        LocalExecutor {
            interpreter: vec!["sh".to_string(), "-c".to_string()],
            backend: PackageBackend::default(),
            env: Vec::new(),
        }
    }

    /// Set the interpreter
    pub fn with_interpreter(mut self, interpreter: Vec<String>) -> Self {
        if !interpreter.is_empty() {
            self.interpreter = interpreter;
        }
        self
    }

    /// Set the package backend
    pub fn with_backend(mut self, backend: PackageBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Add environment variables for spawned commands
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    /// Spawn `script` through the interpreter and wait for it within the deadline
    fn spawn_and_wait(
        &self,
        script: &str,
        deadline: &Deadline,
        interruptible: bool,
    ) -> TransportResult<CommandOutput> {
        let Some((program, interpreter_args)) = self.interpreter.split_first() else {
            return Err(TransportError::Spawn {
                command: script.to_string(),
                error: "no interpreter configured".to_string(),
            });
        };

        let mut command = StdCommand::new(program);
        command
            .args(interpreter_args)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .envs(self.env.iter().map(|(k, v)| (k, v)));

        debug!(command = script, "spawning");

        let mut child = command.spawn().map_err(|e| TransportError::Spawn {
            command: script.to_string(),
            error: e.to_string(),
        })?;

        // Drain pipes on threads so a chatty child cannot block on a full pipe
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            let slice = deadline
                .remaining()
                .map_or(POLL_INTERVAL, |left| left.min(POLL_INTERVAL));

            match child
                .wait_timeout(slice)
                .map_err(|e| TransportError::Io(e.to_string()))?
            {
                Some(status) => break status,
                None if deadline.expired() => {
                    kill(&mut child);
                    let timeout = deadline.timeout().unwrap_or_default();
                    return Err(TransportError::Timeout(timeout));
                }
                None if interruptible && deadline.is_cancelled() => {
                    kill(&mut child);
                    return Err(TransportError::Cancelled);
                }
                None => trace!(command = script, "still running"),
            }
        };

        Ok(CommandOutput {
            exit_code: status.code(),
            stdout: join(stdout),
            stderr: join(stderr),
        })
    }

    /// Run a package manager command that must exit 0
    fn run_checked(
        &self,
        script: &str,
        deadline: &Deadline,
        interruptible: bool,
    ) -> TransportResult<CommandOutput> {
        let output = self.spawn_and_wait(script, deadline, interruptible)?;
        if output.success() {
            return Ok(output);
        }

        let detail = if output.stderr.trim().is_empty() {
            format!("'{}' exited with code {:?}", script, output.exit_code)
        } else {
            output.stderr.trim().to_string()
        };
        Err(TransportError::Backend(detail))
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for LocalExecutor {
    fn run_command(
        &mut self,
        command: &str,
        deadline: &Deadline,
    ) -> TransportResult<CommandOutput> {
        self.spawn_and_wait(command, deadline, true)
    }

    fn package_state(&mut self, name: &str, deadline: &Deadline) -> TransportResult<PackageState> {
        let installed = self
            .spawn_and_wait(
                &PackageBackend::render(self.backend.query_installed, name),
                deadline,
                true,
            )?
            .success();
        if !installed {
            return Ok(PackageState::Absent);
        }

        let outdated = self
            .spawn_and_wait(
                &PackageBackend::render(self.backend.query_outdated, name),
                deadline,
                true,
            )?
            .success();

        Ok(if outdated {
            PackageState::Outdated
        } else {
            PackageState::Installed
        })
    }

    fn install_package(&mut self, name: &str, deadline: &Deadline) -> TransportResult<()> {
        let script = PackageBackend::render(self.backend.install, name);
        self.run_checked(&script, deadline, false).map(|_| ())
    }

    fn upgrade_package(&mut self, name: &str, deadline: &Deadline) -> TransportResult<()> {
        let script = PackageBackend::render(self.backend.upgrade, name);
        self.run_checked(&script, deadline, false).map(|_| ())
    }

    fn update_cache(&mut self, deadline: &Deadline) -> TransportResult<bool> {
        let before = self.spawn_and_wait(self.backend.cache_stamp, deadline, true)?;
        self.run_checked(self.backend.update_cache, deadline, false)?;
        let after = self.spawn_and_wait(self.backend.cache_stamp, deadline, true)?;
        Ok(before.stdout != after.stdout)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = String::new();
            pipe.read_to_string(&mut buf).ok();
            buf
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait(); // Reap the zombie
}
