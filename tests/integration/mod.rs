//! Integration tests for the merge pipeline against real git repositories
//!
//! These tests drive `MergeService` end to end: mergeability checks in
//! temporary workspaces, every merge style, head updates, manual merge
//! detection and branch comparison.

pub mod check;
pub mod compare;
pub mod helpers;
pub mod manual;
pub mod merge;
pub mod update;
