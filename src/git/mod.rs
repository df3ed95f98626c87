//! Git plumbing for the merge pipeline
//!
//! This module provides:
//! - A command builder and runner trait over the git binary
//! - Disposable workspaces for trial merges and merge execution
//! - Merge-base and compare queries, possibly across repositories
//! - Index/tree/commit plumbing for conflict-free merges
//! - Push with typed rejection handling

pub mod command;
pub mod compare;
pub mod env;
pub mod push;
pub mod tree;
pub mod workspace;

pub use command::{is_read_only, GitCommand, GitOutput, GitRunner, RecordingGit, SystemGit};
pub use compare::{get_compare_info, get_merge_base, list_commits, CommitInfo, CompareInfo};
pub use env::{identity_env, internal_push_env, CommitSigning};
pub use push::push;
pub use tree::TrialMerge;
pub use workspace::TempWorkspace;
