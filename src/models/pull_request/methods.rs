use crate::error::{MergeError, Result};

use super::types::{PullRequest, PullRequestFlow, PullRequestStatus};

/// Result of one mergeability check, ready to be written to the row.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeabilityReport {
    pub status: PullRequestStatus,
    pub merge_base: String,
    pub conflicted_files: Vec<String>,
    pub changed_protected_files: Vec<String>,
    pub commits_ahead: u32,
    pub commits_behind: u32,
}

impl MergeabilityReport {
    /// A check that could not complete.
    pub fn error() -> Self {
        Self {
            status: PullRequestStatus::Error,
            merge_base: String::new(),
            conflicted_files: Vec::new(),
            changed_protected_files: Vec::new(),
            commits_ahead: 0,
            commits_behind: 0,
        }
    }
}

/// Fields written once when a pull request is merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRecord {
    pub commit_id: String,
    pub merger_id: i64,
    pub merged_unix: i64,
    pub status: PullRequestStatus,
}

impl PullRequest {
    /// Create a freshly opened pull request in `Checking`.
    pub fn new(
        id: i64,
        issue_id: i64,
        index: i64,
        base_repo_id: i64,
        base_branch: impl Into<String>,
        head_repo_id: i64,
        head_branch: impl Into<String>,
    ) -> Self {
        Self {
            id,
            issue_id,
            index,
            base_repo_id,
            base_branch: base_branch.into(),
            head_repo_id,
            head_branch: head_branch.into(),
            flow: PullRequestFlow::Fork,
            status: PullRequestStatus::Checking,
            merge_base: String::new(),
            conflicted_files: Vec::new(),
            changed_protected_files: Vec::new(),
            commits_ahead: 0,
            commits_behind: 0,
            has_merged: false,
            merged_commit_id: None,
            merger_id: None,
            merged_unix: None,
            check_generation: 0,
        }
    }

    /// Ref in the base repository that tracks the head commit.
    pub fn head_ref(&self) -> String {
        format!("refs/pull/{}/head", self.index)
    }

    pub fn is_same_repo(&self) -> bool {
        self.base_repo_id == self.head_repo_id
    }

    /// Put the row back into `Checking` and bump the generation.
    ///
    /// Returns the new generation, or `None` if the pull request is already
    /// merged and must not be re-tested.
    pub fn begin_check(&mut self) -> Option<u64> {
        if self.has_merged || self.status.is_merged_terminal() {
            return None;
        }
        self.status = PullRequestStatus::Checking;
        self.check_generation += 1;
        Some(self.check_generation)
    }

    /// Undo [`begin_check`](Self::begin_check) for a check that was never
    /// queued. Only the status is restored; the generation stays bumped.
    ///
    /// Returns `false` when a newer check or a merge got there first.
    pub fn cancel_check(&mut self, generation: u64, previous: PullRequestStatus) -> bool {
        if self.has_merged
            || self.check_generation != generation
            || self.status != PullRequestStatus::Checking
        {
            return false;
        }
        self.status = previous;
        true
    }

    /// Write a check result if `generation` is still current.
    ///
    /// Returns `false` and leaves the row untouched when the pull request
    /// merged meanwhile or was re-enqueued after the check started.
    pub fn apply_report(&mut self, generation: u64, report: &MergeabilityReport) -> bool {
        if self.has_merged || self.check_generation != generation {
            return false;
        }
        if !self.status.can_transition_to(&report.status) {
            return false;
        }
        self.status = report.status;
        self.merge_base = report.merge_base.clone();
        self.conflicted_files = report.conflicted_files.clone();
        self.changed_protected_files = report.changed_protected_files.clone();
        self.commits_ahead = report.commits_ahead;
        self.commits_behind = report.commits_behind;
        true
    }

    /// Record the merge. All merge fields change together or not at all.
    pub fn mark_merged(&mut self, record: MergeRecord) -> Result<()> {
        if self.has_merged {
            return Err(MergeError::AlreadyMerged { pr_id: self.id });
        }
        if !record.status.is_merged_terminal() || record.commit_id.is_empty() {
            return Err(MergeError::Store(format!(
                "invalid merge record for pull request {}",
                self.id
            )));
        }
        self.has_merged = true;
        self.status = record.status;
        self.merged_commit_id = Some(record.commit_id);
        self.merger_id = Some(record.merger_id);
        self.merged_unix = Some(record.merged_unix);
        self.conflicted_files.clear();
        Ok(())
    }
}
