use serde::{Deserialize, Serialize};

/// How the head of a pull request reached the base repository.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PullRequestFlow {
    /// Head branch lives in a fork (or a branch of the base repository)
    #[default]
    Fork,
    /// Head was pushed straight into the base repository as a ref (AGit flow)
    Agit,
}

/// A proposed integration of a head branch into a base branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullRequest {
    pub id: i64,
    pub issue_id: i64,
    /// Per-repository number, names `refs/pull/<index>/head`
    pub index: i64,
    pub base_repo_id: i64,
    pub base_branch: String,
    pub head_repo_id: i64,
    pub head_branch: String,
    #[serde(default)]
    pub flow: PullRequestFlow,
    pub status: PullRequestStatus,
    /// Common ancestor from the last completed check
    #[serde(default)]
    pub merge_base: String,
    #[serde(default)]
    pub conflicted_files: Vec<String>,
    #[serde(default)]
    pub changed_protected_files: Vec<String>,
    #[serde(default)]
    pub commits_ahead: u32,
    #[serde(default)]
    pub commits_behind: u32,
    #[serde(default)]
    pub has_merged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_commit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merger_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_unix: Option<i64>,
    /// Bumped on every enqueue; a check only persists if it still matches
    #[serde(default)]
    pub check_generation: u64,
}

/// Mergeability status of a pull request.
///
/// State machine transitions:
/// - `Checking` -> any verdict (`Mergeable` | `Conflict` | `Error` | `Empty` | `Ancestor`)
///   or a merged status
/// - verdicts -> `Checking` (re-test) | `Merged` | `ManuallyMerged`
/// - `Merged` and `ManuallyMerged` are terminal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PullRequestStatus {
    /// Queued for or undergoing a mergeability check
    Checking,
    /// Trial merge succeeded
    Mergeable,
    /// Trial merge hit content conflicts (or unrelated histories)
    Conflict,
    /// The check itself could not complete
    Error,
    /// Merging would not change the base tree
    Empty,
    /// Head is already contained in base
    Ancestor,
    /// Merged outside this system, detected afterwards
    ManuallyMerged,
    /// Merged by the merge executor
    Merged,
}

impl std::fmt::Display for PullRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PullRequestStatus::Checking => write!(f, "Checking"),
            PullRequestStatus::Mergeable => write!(f, "Mergeable"),
            PullRequestStatus::Conflict => write!(f, "Conflict"),
            PullRequestStatus::Error => write!(f, "Error"),
            PullRequestStatus::Empty => write!(f, "Empty"),
            PullRequestStatus::Ancestor => write!(f, "Ancestor"),
            PullRequestStatus::ManuallyMerged => write!(f, "ManuallyMerged"),
            PullRequestStatus::Merged => write!(f, "Merged"),
        }
    }
}

/// Discussion record a pull request hangs off.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: i64,
    pub repo_id: i64,
    pub index: i64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub poster_id: i64,
    #[serde(default)]
    pub is_closed: bool,
}
