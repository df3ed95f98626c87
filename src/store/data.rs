use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{MergeError, Result};
use crate::models::{
    AccessMode, CommitStatus, Conversation, Issue, Permission, ProtectedBranch, PullRequest,
    PullRequestStatus, Repository, Review, User,
};
use crate::models::protected_branch::rule_for_branch;

/// Explicit access grant of a user on a repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collaborator {
    pub repo_id: i64,
    pub user_id: i64,
    pub access: AccessMode,
}

/// All persisted rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreData {
    next_id: i64,
    pub repositories: BTreeMap<i64, Repository>,
    pub users: BTreeMap<i64, User>,
    pub issues: BTreeMap<i64, Issue>,
    pub pull_requests: BTreeMap<i64, PullRequest>,
    pub commit_statuses: Vec<CommitStatus>,
    pub protected_branches: Vec<ProtectedBranch>,
    pub reviews: Vec<Review>,
    pub conversations: Vec<Conversation>,
    pub collaborators: Vec<Collaborator>,
}

impl StoreData {
    /// Allocate a fresh row id, shared across tables.
    pub fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Keep the id counter ahead of an explicitly chosen id.
    fn observe_id(&mut self, id: i64) {
        self.next_id = self.next_id.max(id);
    }

    // -- repositories and users ---------------------------------------------

    pub fn insert_repository(&mut self, repo: Repository) {
        self.observe_id(repo.id);
        self.repositories.insert(repo.id, repo);
    }

    pub fn repository(&self, id: i64) -> Result<&Repository> {
        self.repositories
            .get(&id)
            .ok_or_else(|| MergeError::not_found("repository", id))
    }

    pub fn insert_user(&mut self, user: User) {
        self.observe_id(user.id);
        self.users.insert(user.id, user);
    }

    pub fn user(&self, id: i64) -> Result<&User> {
        self.users
            .get(&id)
            .ok_or_else(|| MergeError::not_found("user", id))
    }

    /// Case-insensitive lookup by commit email.
    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    pub fn grant(&mut self, repo_id: i64, user_id: i64, access: AccessMode) {
        self.collaborators
            .retain(|c| !(c.repo_id == repo_id && c.user_id == user_id));
        self.collaborators.push(Collaborator {
            repo_id,
            user_id,
            access,
        });
    }

    /// Effective permission: repository owners are admins.
    pub fn permission(&self, repo_id: i64, user_id: i64) -> Permission {
        if let Ok(repo) = self.repository(repo_id) {
            if repo.owner_id == user_id {
                return Permission::new(AccessMode::Admin);
            }
        }
        let access = self
            .collaborators
            .iter()
            .find(|c| c.repo_id == repo_id && c.user_id == user_id)
            .map(|c| c.access)
            .unwrap_or_default();
        Permission::new(access)
    }

    // -- issues and pull requests -------------------------------------------

    pub fn insert_issue(&mut self, issue: Issue) {
        self.observe_id(issue.id);
        self.issues.insert(issue.id, issue);
    }

    pub fn issue(&self, id: i64) -> Result<&Issue> {
        self.issues
            .get(&id)
            .ok_or_else(|| MergeError::not_found("issue", id))
    }

    pub fn issue_mut(&mut self, id: i64) -> Result<&mut Issue> {
        self.issues
            .get_mut(&id)
            .ok_or_else(|| MergeError::not_found("issue", id))
    }

    pub fn insert_pull_request(&mut self, pr: PullRequest) {
        self.observe_id(pr.id);
        self.pull_requests.insert(pr.id, pr);
    }

    pub fn pull_request(&self, id: i64) -> Result<&PullRequest> {
        self.pull_requests
            .get(&id)
            .ok_or_else(|| MergeError::not_found("pull request", id))
    }

    pub fn pull_request_mut(&mut self, id: i64) -> Result<&mut PullRequest> {
        self.pull_requests
            .get_mut(&id)
            .ok_or_else(|| MergeError::not_found("pull request", id))
    }

    /// Ids of pull requests matching `filter`, in id order.
    pub fn pull_request_ids_where(&self, filter: impl Fn(&PullRequest) -> bool) -> Vec<i64> {
        self.pull_requests
            .values()
            .filter(|pr| filter(pr))
            .map(|pr| pr.id)
            .collect()
    }

    /// Open (unmerged, issue not closed) pull requests targeting a branch.
    pub fn open_pull_requests_by_base(&self, repo_id: i64, branch: &str) -> Vec<i64> {
        self.pull_request_ids_where(|pr| {
            pr.base_repo_id == repo_id
                && pr.base_branch == branch
                && !pr.has_merged
                && self.issue(pr.issue_id).map(|i| !i.is_closed).unwrap_or(true)
        })
    }

    /// Open pull requests whose head is the given branch.
    pub fn open_pull_requests_by_head(&self, repo_id: i64, branch: &str) -> Vec<i64> {
        self.pull_request_ids_where(|pr| {
            pr.head_repo_id == repo_id
                && pr.head_branch == branch
                && !pr.has_merged
                && self.issue(pr.issue_id).map(|i| !i.is_closed).unwrap_or(true)
        })
    }

    pub fn checking_pull_requests(&self) -> Vec<i64> {
        self.pull_request_ids_where(|pr| pr.status == PullRequestStatus::Checking && !pr.has_merged)
    }

    // -- protection, statuses, reviews --------------------------------------

    pub fn insert_protected_branch(&mut self, mut rule: ProtectedBranch) -> i64 {
        if rule.id == 0 {
            rule.id = self.next_id();
        } else {
            self.observe_id(rule.id);
        }
        let id = rule.id;
        self.protected_branches.push(rule);
        id
    }

    pub fn protected_branch(&self, repo_id: i64, branch: &str) -> Option<&ProtectedBranch> {
        rule_for_branch(
            self.protected_branches.iter().filter(|r| r.repo_id == repo_id),
            branch,
        )
    }

    /// Append a status report. `index` is assigned per sha.
    pub fn add_commit_status(&mut self, mut status: CommitStatus) -> i64 {
        status.id = self.next_id();
        status.index = self
            .commit_statuses
            .iter()
            .filter(|s| s.repo_id == status.repo_id && s.sha == status.sha)
            .map(|s| s.index)
            .max()
            .unwrap_or(0)
            + 1;
        let id = status.id;
        self.commit_statuses.push(status);
        id
    }

    pub fn commit_statuses(&self, repo_id: i64, sha: &str) -> Vec<&CommitStatus> {
        self.commit_statuses
            .iter()
            .filter(|s| s.repo_id == repo_id && s.sha == sha)
            .collect()
    }

    pub fn add_review(&mut self, mut review: Review) -> i64 {
        review.id = self.next_id();
        for earlier in self
            .reviews
            .iter_mut()
            .filter(|r| r.issue_id == review.issue_id && r.reviewer_id == review.reviewer_id)
        {
            earlier.dismissed = true;
        }
        let id = review.id;
        self.reviews.push(review);
        id
    }

    /// Effective (not superseded) reviews on an issue.
    pub fn reviews(&self, issue_id: i64) -> Vec<&Review> {
        self.reviews
            .iter()
            .filter(|r| r.issue_id == issue_id && r.is_effective())
            .collect()
    }

    /// Mark every review on an issue stale, e.g. after a head push.
    pub fn mark_reviews_stale(&mut self, issue_id: i64) {
        for review in self.reviews.iter_mut().filter(|r| r.issue_id == issue_id) {
            review.stale = true;
        }
    }

    pub fn add_conversation(&mut self, mut conversation: Conversation) -> i64 {
        conversation.id = self.next_id();
        let id = conversation.id;
        self.conversations.push(conversation);
        id
    }

    pub fn conversations(&self, issue_id: i64) -> Vec<&Conversation> {
        self.conversations
            .iter()
            .filter(|c| c.issue_id == issue_id)
            .collect()
    }
}
