//! Process exit codes

/// Every task completed, was skipped, ignored or rescued
pub const OK: i32 = 0;

/// The plan or its configuration could not be loaded
pub const INVALID: i32 = 1;

/// An unhandled task failure aborted the run
pub const ABORTED: i32 = 2;

/// The run was interrupted (128 + SIGINT)
pub const CANCELLED: i32 = 130;
