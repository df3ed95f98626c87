//! CLI command implementations
//!
//! Each command builds a [`runtime::Runtime`] from configuration and drives
//! the [`crate::pull::MergeService`] it holds.

pub mod check;
pub mod merge;
pub mod runtime;
pub mod serve;
pub mod status;

pub use runtime::Runtime;
