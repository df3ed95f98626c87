mod methods;
mod transitions;
mod types;


pub use methods::{MergeRecord, MergeabilityReport};
pub use types::{Issue, PullRequest, PullRequestFlow, PullRequestStatus};
