use std::collections::HashSet;

use crate::git::CommitInfo;
use crate::models::{Issue, MergeStyle, PullRequest, Repository, User};

/// Default commit message for a merge of `pr` with `style`.
pub fn default_message(
    style: MergeStyle,
    pr: &PullRequest,
    issue: &Issue,
    head_repo: &Repository,
) -> String {
    match style {
        MergeStyle::Squash => {
            let mut message = format!("{} (#{})", issue.title, issue.index);
            if !issue.body.trim().is_empty() {
                message.push_str("\n\n");
                message.push_str(issue.body.trim());
            }
            message
        }
        _ => {
            let head = if pr.is_same_repo() {
                pr.head_branch.clone()
            } else {
                format!("{}:{}", head_repo.full_name(), pr.head_branch)
            };
            format!(
                "Merge pull request '{}' (#{}) from {} into {}",
                issue.title, issue.index, head, pr.base_branch
            )
        }
    }
}

/// Message for bringing the base branch into the head branch.
pub fn update_message(pr: &PullRequest) -> String {
    format!("Merge branch '{}' into {}", pr.base_branch, pr.head_branch)
}

/// `Co-authored-by` trailers for a squash authored by `author`.
///
/// Commits are expected oldest first; each email appears once, keeping the
/// first name seen, and the squash author is left out.
pub fn co_author_trailers(commits: &[CommitInfo], author: &User) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(author.email.to_lowercase());

    commits
        .iter()
        .filter(|c| !c.author_email.is_empty())
        .filter(|c| seen.insert(c.author_email.to_lowercase()))
        .map(|c| format!("Co-authored-by: {} <{}>", c.author_name, c.author_email))
        .collect()
}

/// Append trailers not already present in `message`.
pub fn with_trailers(message: &str, trailers: &[String]) -> String {
    let missing: Vec<&String> = trailers.iter().filter(|t| !message.contains(t.as_str())).collect();
    let mut out = message.trim_end().to_string();
    if missing.is_empty() {
        return out;
    }
    out.push_str("\n\n");
    for (i, trailer) in missing.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(trailer);
    }
    out
}
