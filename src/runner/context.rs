//! Execution context for a run
//!
//! The context carries the settings a runner needs that do not belong to the
//! plan itself: the default task timeout and the cancellation token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared cancellation flag
///
/// Clones observe the same flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Execution context that carries run-wide settings
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Timeout applied to tasks that do not set their own
    pub default_timeout: Option<Duration>,

    /// Cancellation token checked before every task
    pub cancellation: Cancellation,
}

impl Context {
    /// Create a new context with no default timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default task timeout
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Use an existing cancellation token
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Effective timeout for a task
    pub fn timeout_for(&self, task_timeout: Option<Duration>) -> Option<Duration> {
        task_timeout.or(self.default_timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
