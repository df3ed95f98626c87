use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::MergeError;

/// Strategy used to integrate a pull request into its base branch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStyle {
    /// Two-parent merge commit
    Merge,
    /// Replay head commits onto base and fast-forward
    Rebase,
    /// Rebase, then an explicit `--no-ff` merge commit
    RebaseMerge,
    /// One commit with the combined changes
    Squash,
    /// Record a merge that already happened outside the system
    ManuallyMerged,
}

impl MergeStyle {
    pub const ALL: [MergeStyle; 5] = [
        MergeStyle::Merge,
        MergeStyle::Rebase,
        MergeStyle::RebaseMerge,
        MergeStyle::Squash,
        MergeStyle::ManuallyMerged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStyle::Merge => "merge",
            MergeStyle::Rebase => "rebase",
            MergeStyle::RebaseMerge => "rebase-merge",
            MergeStyle::Squash => "squash",
            MergeStyle::ManuallyMerged => "manually-merged",
        }
    }

    /// Styles that rewrite the head commits before landing them.
    pub fn is_rebase(&self) -> bool {
        matches!(self, MergeStyle::Rebase | MergeStyle::RebaseMerge)
    }
}

impl std::fmt::Display for MergeStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStyle {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MergeStyle::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| MergeError::InvalidMergeStyle(s.to_string()))
    }
}
