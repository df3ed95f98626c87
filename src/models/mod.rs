pub mod commit_status;
pub mod merge_style;
pub mod protected_branch;
pub mod pull_request;
pub mod repository;
pub mod review;

pub use commit_status::{CommitStatus, CommitStatusState};
pub use merge_style::MergeStyle;
pub use protected_branch::ProtectedBranch;
pub use pull_request::{
    Issue, MergeRecord, MergeabilityReport, PullRequest, PullRequestFlow, PullRequestStatus,
};
pub use repository::{AccessMode, Permission, RepoSettings, Repository, User};
pub use review::{Conversation, Review, ReviewKind};
