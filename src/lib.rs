//! Rplay - declarative YAML provisioning plans
//!
//! A plan is an ordered list of tasks. Each task performs one idempotent
//! action against a target, may register its result under a name, and may be
//! gated on a condition over earlier results. Failures abort the plan unless
//! ignored or recovered by a block's rescue section.

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod runner;
pub mod ui;

// Re-export commonly used types
pub use error::{Result, RplayError};

/// Current version of Rplay
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
