//! Error types for the merge pipeline
//!
//! Every failure the pipeline can report is a variant of [`MergeError`].
//! Callers at the boundary (CLI, HTTP layer) match on the variant instead of
//! inspecting message strings.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::{CommitStatusState, MergeStyle};

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, MergeError>;

/// Why a pull request may not be merged right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotAllowedReason {
    /// The doer lacks write access or is not on the merge whitelist
    NoPermission,
    /// Required status checks have not all passed
    StatusChecks(CommitStatusState),
    /// Not enough official approvals
    InsufficientApprovals { required: u32, granted: u32 },
    /// An official reviewer requested changes
    RejectedReviews,
    /// The head branch is behind the base branch
    OutdatedBranch { behind: u32 },
    /// Conversations on the pull request are still open
    UnresolvedConversations { count: usize },
    /// The pull request touches protected files
    ProtectedFiles { files: Vec<String> },
    /// The pull request is still being tested
    StillChecking,
    /// The last test did not find the pull request mergeable
    NotMergeable,
}

impl std::fmt::Display for NotAllowedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotAllowedReason::NoPermission => write!(f, "user is not allowed to merge"),
            NotAllowedReason::StatusChecks(state) => {
                write!(f, "required status checks are {state}")
            }
            NotAllowedReason::InsufficientApprovals { required, granted } => {
                write!(f, "{granted} of {required} required approvals granted")
            }
            NotAllowedReason::RejectedReviews => write!(f, "changes were requested"),
            NotAllowedReason::OutdatedBranch { behind } => {
                write!(f, "head branch is {behind} commit(s) behind base")
            }
            NotAllowedReason::UnresolvedConversations { count } => {
                write!(f, "{count} unresolved conversation(s)")
            }
            NotAllowedReason::ProtectedFiles { files } => {
                write!(f, "protected files changed: {}", files.join(", "))
            }
            NotAllowedReason::StillChecking => write!(f, "mergeability check in progress"),
            NotAllowedReason::NotMergeable => write!(f, "pull request is not mergeable"),
        }
    }
}

/// All errors produced by the merge pipeline.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("branch '{branch}' not found")]
    BranchNotFound { branch: String },

    #[error("source repository missing: {}", path.display())]
    RepoMissing { path: PathBuf },

    #[error("clone of '{branch}' failed: {stderr}")]
    CloneFailed { branch: String, stderr: String },

    #[error("no merge base between {base} and {head}")]
    NoMergeBase { base: String, head: String },

    #[error("git {command} timed out after {}s", after.as_secs())]
    Timeout { command: String, after: Duration },

    #[error("git {command} cancelled")]
    Cancelled { command: String },

    #[error("git {command} failed (exit {code:?}): {stderr}")]
    Git {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("merge conflict ({style}) in {} file(s)", files.len())]
    Conflict { style: MergeStyle, files: Vec<String> },

    #[error("rebase conflict while applying {commit}")]
    RebaseConflict { commit: String, files: Vec<String> },

    #[error("refusing to merge unrelated histories")]
    UnrelatedHistories,

    #[error("head is out of date: expected {expected}, found {actual}")]
    HeadOutOfDate { expected: String, actual: String },

    #[error("push rejected, base branch moved: {stderr}")]
    PushOutOfDate { stderr: String },

    #[error("push rejected by remote: {message}")]
    PushRejected { message: String },

    #[error("not allowed to merge: {reason}")]
    NotAllowedToMerge { reason: NotAllowedReason },

    #[error("merge commit would not be signed: {reason}")]
    WontSign { reason: String },

    #[error("invalid merge style '{0}'")]
    InvalidMergeStyle(String),

    #[error("merge style {0} is disabled for this repository")]
    MergeStyleNotAllowed(MergeStyle),

    #[error("pull request {pr_id} is already merged")]
    AlreadyMerged { pr_id: i64 },

    #[error("commit {commit} is not a merge of this pull request")]
    InvalidMergedCommit { commit: String },

    #[error("pull request {pr_id} cannot be updated: {reason}")]
    UpdateNotSupported { pr_id: i64, reason: String },

    #[error("target branch '{branch}' is invalid: {reason}")]
    InvalidTargetBranch { branch: String, reason: String },

    #[error("queue is closed")]
    QueueClosed,

    #[error("queue is full ({capacity} entries)")]
    QueueFull { capacity: usize },

    #[error("store error: {0}")]
    Store(String),

    #[error("{op} failed for pull request {pr_id}: {source}")]
    Context {
        op: &'static str,
        pr_id: i64,
        #[source]
        source: Box<MergeError>,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MergeError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        MergeError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Attach the operation and pull request id to an error.
    pub fn context(self, op: &'static str, pr_id: i64) -> Self {
        MergeError::Context {
            op,
            pr_id,
            source: Box::new(self),
        }
    }

    /// The innermost error, with any [`MergeError::Context`] layers removed.
    pub fn root(&self) -> &MergeError {
        match self {
            MergeError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Content conflicts that only new commits can resolve.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self.root(),
            MergeError::Conflict { .. }
                | MergeError::RebaseConflict { .. }
                | MergeError::UnrelatedHistories
        )
    }

    /// Failures worth retrying on the next triggering event.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.root(),
            MergeError::Timeout { .. } | MergeError::Io(_) | MergeError::PushOutOfDate { .. }
        )
    }

    /// Files to show in a conflict hint, if any.
    pub fn conflicted_files(&self) -> &[String] {
        match self.root() {
            MergeError::Conflict { files, .. } | MergeError::RebaseConflict { files, .. } => files,
            _ => &[],
        }
    }
}

/// Map well-known git stderr messages to typed errors.
///
/// Returns `None` when the message is not recognised and the caller should
/// fall back to a generic [`MergeError::Git`].
pub fn classify_git_stderr(stderr: &str, subject: &str) -> Option<MergeError> {
    if stderr.contains("not found in upstream") || stderr.contains("couldn't find remote ref") {
        return Some(MergeError::BranchNotFound {
            branch: subject.to_string(),
        });
    }
    if stderr.contains("does not exist") {
        return Some(MergeError::RepoMissing {
            path: PathBuf::from(subject),
        });
    }
    if stderr.contains("no merge base") {
        return Some(MergeError::NoMergeBase {
            base: subject.to_string(),
            head: String::new(),
        });
    }
    if stderr.contains("refusing to merge unrelated histories") {
        return Some(MergeError::UnrelatedHistories);
    }
    None
}
