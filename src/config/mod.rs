//! Plan file parsing and validation
//!
//! This module handles parsing of rplay.yml plan files
//! and structural validation of their entries.

pub mod parse;
pub mod schema;
pub mod types;

// Re-export main types
pub use parse::*;
pub use schema::*;
pub use types::*;
