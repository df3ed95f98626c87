use serde::{Deserialize, Serialize};

/// State reported by an external check for one commit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CommitStatusState {
    Pending,
    Success,
    Error,
    Failure,
    Warning,
}

impl CommitStatusState {
    /// Lower is worse.
    fn priority(&self) -> u8 {
        match self {
            CommitStatusState::Error => 0,
            CommitStatusState::Failure => 1,
            CommitStatusState::Warning => 2,
            CommitStatusState::Pending => 3,
            CommitStatusState::Success => 4,
        }
    }

    /// True when `self` is at least as bad as `other`.
    pub fn no_better_than(&self, other: &CommitStatusState) -> bool {
        self.priority() <= other.priority()
    }

    pub fn is_success(&self) -> bool {
        *self == CommitStatusState::Success
    }

    /// The worse of the two states.
    pub fn worst(self, other: CommitStatusState) -> CommitStatusState {
        if self.no_better_than(&other) {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for CommitStatusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommitStatusState::Pending => "pending",
            CommitStatusState::Success => "success",
            CommitStatusState::Error => "error",
            CommitStatusState::Failure => "failure",
            CommitStatusState::Warning => "warning",
        };
        f.write_str(s)
    }
}

/// One status report for a commit in a repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitStatus {
    pub id: i64,
    pub repo_id: i64,
    pub sha: String,
    pub context: String,
    pub state: CommitStatusState,
    #[serde(default)]
    pub description: String,
    /// Increases with every report for the same sha; latest wins per context
    pub index: i64,
}
