//! Process utilities
//!
//! Subprocess execution with bounded timeouts, concurrent output draining and
//! external cancellation. Nothing here knows about git.

mod cancel;
mod runner;

pub use cancel::CancelToken;
pub use runner::{ProcessRunner, RunError, RunOptions, RunOutput, StdinSource, Timeout};
