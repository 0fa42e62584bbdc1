//! Task execution engine
//!
//! This module handles plan construction and execution: actions and the
//! targets they run against, the result registry, condition evaluation,
//! failure policy and block/rescue/always groups.

pub mod action;
pub mod command;
pub mod context;
pub mod executor;
pub mod fake;
pub mod interpolate;
pub mod outcome;
pub mod plan;
pub mod policy;
pub mod registry;
pub mod run;
pub mod task;
pub mod when;

// Re-export main types
pub use action::*;
pub use command::*;
pub use context::*;
pub use executor::*;
pub use fake::*;
pub use interpolate::*;
pub use outcome::*;
pub use plan::*;
pub use policy::*;
pub use registry::*;
pub use run::*;
pub use task::*;
pub use when::*;
