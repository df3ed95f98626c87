//! Environment blocks for commits and pushes made by the service

use crate::models::User;

/// Marker telling server-side hooks that a push came from the merge service.
pub const ENV_INTERNAL_PUSH: &str = "MERGEQ_INTERNAL_PUSH";
pub const ENV_PR_ID: &str = "MERGEQ_PR_ID";
pub const ENV_PUSHER_ID: &str = "MERGEQ_PUSHER_ID";
pub const ENV_PUSHER_NAME: &str = "MERGEQ_PUSHER_NAME";
pub const ENV_REPO_NAME: &str = "MERGEQ_REPO_NAME";

/// Author and committer identity for commits created on a user's behalf.
pub fn identity_env(author: &User, committer: &User) -> Vec<(String, String)> {
    vec![
        ("GIT_AUTHOR_NAME".to_string(), author.name.clone()),
        ("GIT_AUTHOR_EMAIL".to_string(), author.email.clone()),
        ("GIT_COMMITTER_NAME".to_string(), committer.name.clone()),
        ("GIT_COMMITTER_EMAIL".to_string(), committer.email.clone()),
    ]
}

/// Environment for pushing a merge result back to a repository.
///
/// Carries the committer identity plus the internal markers hooks use to
/// recognise the push and attribute it to the pull request.
pub fn internal_push_env(doer: &User, pr_id: i64, repo_full_name: &str) -> Vec<(String, String)> {
    let mut env = identity_env(doer, doer);
    env.extend([
        (ENV_INTERNAL_PUSH.to_string(), "true".to_string()),
        (ENV_PR_ID.to_string(), pr_id.to_string()),
        (ENV_PUSHER_ID.to_string(), doer.id.to_string()),
        (ENV_PUSHER_NAME.to_string(), doer.name.clone()),
        (ENV_REPO_NAME.to_string(), repo_full_name.to_string()),
        ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
    ]);
    env
}

/// Signing flag for commit-producing commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitSigning {
    Key(String),
    Unsigned,
}

impl CommitSigning {
    pub fn arg(&self) -> String {
        match self {
            CommitSigning::Key(key) => format!("-S{key}"),
            CommitSigning::Unsigned => "--no-gpg-sign".to_string(),
        }
    }
}
