use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewKind {
    Approve,
    Comment,
    RequestChanges,
    /// Review requested but not yet given
    Request,
}

/// A review left on a pull request's issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub id: i64,
    pub issue_id: i64,
    pub reviewer_id: i64,
    pub kind: ReviewKind,
    /// Counts towards branch protection (reviewer had write access)
    #[serde(default)]
    pub official: bool,
    /// Head moved since the review was given
    #[serde(default)]
    pub stale: bool,
    /// Head commit the review was given against
    #[serde(default)]
    pub commit_id: String,
    /// Superseded by a later review from the same reviewer
    #[serde(default)]
    pub dismissed: bool,
}

impl Review {
    pub fn is_effective(&self) -> bool {
        !self.dismissed
    }
}

/// A code-comment thread on a pull request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: i64,
    pub issue_id: i64,
    #[serde(default)]
    pub resolved: bool,
    /// Hidden because the code it points at changed
    #[serde(default)]
    pub invalidated: bool,
}

impl Conversation {
    pub fn is_blocking(&self) -> bool {
        !self.resolved && !self.invalidated
    }
}
