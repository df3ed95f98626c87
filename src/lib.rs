pub mod commands;
pub mod config;
pub mod error;
pub mod fs;
pub mod git;
pub mod models;
pub mod notify;
pub mod process;
pub mod pull;
pub mod queue;
pub mod store;

pub use error::{MergeError, Result};
pub use pull::{MergeRequest, MergeService};
