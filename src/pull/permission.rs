//! Merge gating: who may merge and whether the pull request is ready

use tracing::debug;

use super::MergeService;
use crate::error::{MergeError, NotAllowedReason, Result};
use crate::models::{
    CommitStatusState, Conversation, Permission, ProtectedBranch, PullRequest, PullRequestStatus,
    Review, ReviewKind, User,
};

/// Whether `user` may merge into a branch protected by `rule`.
///
/// With a merge whitelist only listed users may merge; otherwise write
/// access is required. Authoring the pull request grants nothing.
pub fn is_user_allowed_to_merge(
    rule: Option<&ProtectedBranch>,
    permission: Permission,
    user: Option<&User>,
) -> bool {
    let Some(user) = user else {
        return false;
    };
    match rule {
        Some(rule) if rule.enable_merge_whitelist => rule.can_user_merge(user.id),
        _ => permission.can_write(),
    }
}

/// Everything the readiness rules look at.
pub struct ReadinessInput<'a> {
    pub pr: &'a PullRequest,
    pub poster_id: i64,
    pub rule: Option<&'a ProtectedBranch>,
    /// Aggregated head status; only consulted when the rule requires checks
    pub status_state: Option<CommitStatusState>,
    pub reviews: &'a [&'a Review],
    pub conversations: &'a [&'a Conversation],
    pub skip_protected_files_check: bool,
}

fn not_allowed(reason: NotAllowedReason) -> MergeError {
    MergeError::NotAllowedToMerge { reason }
}

/// Official approvals that count towards the rule.
fn granted_approvals(input: &ReadinessInput<'_>, rule: &ProtectedBranch) -> u32 {
    let count = input
        .reviews
        .iter()
        .filter(|r| r.kind == ReviewKind::Approve && r.official && r.is_effective())
        .filter(|r| !(rule.dismiss_stale_approvals && r.stale))
        .filter(|r| r.reviewer_id != input.poster_id)
        .filter(|r| rule.is_approver(r.reviewer_id))
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Apply the branch protection rules to a pull request.
pub fn check_readiness(input: &ReadinessInput<'_>) -> Result<()> {
    let Some(rule) = input.rule else {
        return Ok(());
    };

    if rule.enable_status_check {
        let state = input.status_state.unwrap_or(CommitStatusState::Pending);
        if !state.is_success() {
            return Err(not_allowed(NotAllowedReason::StatusChecks(state)));
        }
    }

    let granted = granted_approvals(input, rule);
    if granted < rule.required_approvals {
        return Err(not_allowed(NotAllowedReason::InsufficientApprovals {
            required: rule.required_approvals,
            granted,
        }));
    }

    if rule.block_on_rejected_reviews
        && input
            .reviews
            .iter()
            .any(|r| r.kind == ReviewKind::RequestChanges && r.official && r.is_effective())
    {
        return Err(not_allowed(NotAllowedReason::RejectedReviews));
    }

    if rule.block_on_outdated_branch && input.pr.commits_behind > 0 {
        return Err(not_allowed(NotAllowedReason::OutdatedBranch {
            behind: input.pr.commits_behind,
        }));
    }

    if rule.block_on_unresolved_conversations {
        let count = input.conversations.iter().filter(|c| c.is_blocking()).count();
        if count > 0 {
            return Err(not_allowed(NotAllowedReason::UnresolvedConversations { count }));
        }
    }

    if !input.skip_protected_files_check && !input.pr.changed_protected_files.is_empty() {
        return Err(not_allowed(NotAllowedReason::ProtectedFiles {
            files: input.pr.changed_protected_files.clone(),
        }));
    }

    Ok(())
}

impl MergeService {
    /// Whether `user_id` may merge the pull request. No user means no.
    pub fn is_user_allowed_to_merge(&self, pr_id: i64, user_id: Option<i64>) -> Result<bool> {
        let ctx = self.load_context(pr_id)?;
        self.store.view(|data| {
            let user = user_id.and_then(|id| data.user(id).ok());
            let permission = user
                .map(|u| data.permission(ctx.pr.base_repo_id, u.id))
                .unwrap_or_default();
            Ok(is_user_allowed_to_merge(ctx.rule.as_ref(), permission, user))
        })
    }

    /// Check status checks, approvals, reviews, branch freshness,
    /// conversations and protected files against the base branch rule.
    pub fn check_pr_ready_to_merge(&self, pr_id: i64, skip_protected_files_check: bool) -> Result<()> {
        let ctx = self.load_context(pr_id)?;
        let status_state = match &ctx.rule {
            Some(rule) if rule.enable_status_check => Some(self.commit_status_state(pr_id)?),
            _ => None,
        };

        self.store.view(|data| {
            let reviews = data.reviews(ctx.issue.id);
            let conversations = data.conversations(ctx.issue.id);
            check_readiness(&ReadinessInput {
                pr: &ctx.pr,
                poster_id: ctx.issue.poster_id,
                rule: ctx.rule.as_ref(),
                status_state,
                reviews: &reviews,
                conversations: &conversations,
                skip_protected_files_check,
            })
        })
    }

    /// Composite gate run before every merge: merged state, check state,
    /// permission and readiness.
    pub fn check_pull_mergeable(
        &self,
        pr_id: i64,
        doer_id: i64,
        skip_protected_files_check: bool,
    ) -> Result<()> {
        let ctx = self.load_context(pr_id)?;
        if ctx.pr.has_merged {
            return Err(MergeError::AlreadyMerged { pr_id });
        }
        match ctx.pr.status {
            PullRequestStatus::Checking => return Err(not_allowed(NotAllowedReason::StillChecking)),
            PullRequestStatus::Mergeable | PullRequestStatus::Empty => {}
            other => {
                debug!(pr_id, status = %other, "pull request not mergeable");
                return Err(not_allowed(NotAllowedReason::NotMergeable));
            }
        }
        if !self.is_user_allowed_to_merge(pr_id, Some(doer_id))? {
            return Err(not_allowed(NotAllowedReason::NoPermission));
        }
        self.check_pr_ready_to_merge(pr_id, skip_protected_files_check)
    }
}
