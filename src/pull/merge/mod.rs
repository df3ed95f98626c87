//! Merge execution
//!
//! `merge` re-validates everything the web layer showed the user, builds the
//! result in a disposable workspace, pushes it to the base repository and
//! records the merge in one transaction. Nothing is written anywhere before
//! the head, permission and readiness checks pass.

mod message;
mod styles;

pub use message::{co_author_trailers, default_message, update_message, with_trailers};
pub(crate) use styles::rebase_onto;

use tracing::{info, warn};

use super::{MergeService, PullContext};
use crate::error::{MergeError, Result};
use crate::git::env::{identity_env, internal_push_env, CommitSigning};
use crate::git::tree::{is_ancestor, rev_parse};
use crate::git::{list_commits, push, GitCommand};
use crate::models::{MergeRecord, MergeStyle, ProtectedBranch, PullRequestStatus, User};
use crate::notify::PullRequestEvent;

use super::prepare::{BASE, TRACKING};

/// A request to merge one pull request.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRequest {
    pub pr_id: i64,
    pub doer_id: i64,
    pub style: MergeStyle,
    /// Head commit the doer saw; the merge is refused if the head moved
    pub expected_head: Option<String>,
    /// Commit message, or the style's default
    pub message: Option<String>,
    /// Admin override for the protected-files rule
    pub skip_protected_files_check: bool,
    /// For [`MergeStyle::ManuallyMerged`]: the commit that merged the head
    pub merged_commit: Option<String>,
}

impl MergeRequest {
    pub fn new(pr_id: i64, doer_id: i64, style: MergeStyle) -> Self {
        Self {
            pr_id,
            doer_id,
            style,
            expected_head: None,
            message: None,
            skip_protected_files_check: false,
            merged_commit: None,
        }
    }
}

fn is_full_commit_id(id: &str) -> bool {
    matches!(id.len(), 40 | 64) && id.chars().all(|c| c.is_ascii_hexdigit())
}

impl MergeService {
    /// Signing flag for commits made by `doer` on a branch under `rule`.
    pub(crate) fn signing_for(
        &self,
        rule: Option<&ProtectedBranch>,
        doer: &User,
    ) -> Result<CommitSigning> {
        let key = doer
            .signing_key
            .clone()
            .or_else(|| self.config.signing.default_key.clone());
        match key {
            Some(key) => Ok(CommitSigning::Key(key)),
            None if rule.is_some_and(|r| r.require_signed_commits) => Err(MergeError::WontSign {
                reason: "branch requires signed commits and no signing key is available".to_string(),
            }),
            None => Ok(CommitSigning::Unsigned),
        }
    }

    /// Merge a pull request. Returns the commit now at the tip of the base
    /// branch.
    pub fn merge(&self, req: &MergeRequest) -> Result<String> {
        self.with_pr_lock(req.pr_id, || self.merge_locked(req))
            .map_err(|e| match e {
                MergeError::Git { .. }
                | MergeError::Io(_)
                | MergeError::Timeout { .. }
                | MergeError::Cancelled { .. } => e.context("merge", req.pr_id),
                e => e,
            })
    }

    fn merge_locked(&self, req: &MergeRequest) -> Result<String> {
        let ctx = self.load_context(req.pr_id)?;
        if ctx.pr.has_merged {
            return Err(MergeError::AlreadyMerged { pr_id: req.pr_id });
        }
        if !ctx.base_repo.settings.is_style_allowed(req.style) {
            return Err(MergeError::MergeStyleNotAllowed(req.style));
        }
        let (doer, poster) = self.store.view(|data| {
            Ok((data.user(req.doer_id)?.clone(), data.user(ctx.issue.poster_id)?.clone()))
        })?;

        if req.style == MergeStyle::ManuallyMerged {
            return self.merge_manually(&ctx, req, &doer);
        }

        let live_head = self.head_commit_id(&ctx)?;
        if let Some(expected) = &req.expected_head {
            if *expected != live_head {
                return Err(MergeError::HeadOutOfDate {
                    expected: expected.clone(),
                    actual: live_head,
                });
            }
        }

        self.check_pull_mergeable(req.pr_id, req.doer_id, req.skip_protected_files_check)?;
        let signing = self.signing_for(ctx.rule.as_ref(), &doer)?;

        let prepared = self.prepare_pull(&ctx)?;
        if prepared.head_commit != live_head {
            return Err(MergeError::HeadOutOfDate {
                expected: live_head,
                actual: prepared.head_commit.clone(),
            });
        }

        let git = self.git.as_ref();
        let message = req
            .message
            .clone()
            .unwrap_or_else(|| default_message(req.style, &ctx.pr, &ctx.issue, &ctx.head_repo));

        info!(pr_id = req.pr_id, style = %req.style, doer = req.doer_id, "merging pull request");
        let merged_commit = match req.style {
            MergeStyle::Merge => {
                styles::merge_commit(git, &prepared, &message, &signing, identity_env(&doer, &doer))?
            }
            MergeStyle::Squash => {
                let range = format!("{BASE}..{TRACKING}");
                let commits = list_commits(git, prepared.dir(), &["--reverse", range.as_str()])?;
                let message = with_trailers(&message, &co_author_trailers(&commits, &poster));
                styles::squash_commit(git, &prepared, &message, &signing, identity_env(&poster, &doer))?
            }
            MergeStyle::Rebase | MergeStyle::RebaseMerge => styles::rebase_and_land(
                git,
                &prepared,
                req.style,
                &message,
                &signing,
                identity_env(&doer, &doer),
            )?,
            MergeStyle::ManuallyMerged => {
                return Err(MergeError::InvalidMergeStyle(req.style.to_string()))
            }
        };

        push(
            git,
            prepared.dir(),
            "origin",
            &format!("HEAD:refs/heads/{}", ctx.pr.base_branch),
            None,
            internal_push_env(&doer, req.pr_id, &ctx.base_repo.full_name()),
        )?;
        if let Err(e) = prepared.ws.close() {
            warn!(pr_id = req.pr_id, "workspace cleanup failed: {e}");
        }

        self.record_merge(
            &ctx,
            &merged_commit,
            doer.id,
            PullRequestStatus::Merged,
            req.style,
        )?;
        Ok(merged_commit)
    }

    /// Acknowledge a merge the doer made outside the service.
    fn merge_manually(&self, ctx: &PullContext, req: &MergeRequest, doer: &User) -> Result<String> {
        let permission = self
            .store
            .view(|data| Ok(data.permission(ctx.pr.base_repo_id, doer.id)))?;
        if !super::is_user_allowed_to_merge(ctx.rule.as_ref(), permission, Some(doer)) {
            return Err(MergeError::NotAllowedToMerge {
                reason: crate::error::NotAllowedReason::NoPermission,
            });
        }

        let commit = req.merged_commit.clone().unwrap_or_default();
        let invalid = || MergeError::InvalidMergedCommit {
            commit: commit.clone(),
        };
        if !is_full_commit_id(&commit) {
            return Err(invalid());
        }

        let git = self.git.as_ref();
        let repo = ctx.base_repo.path.as_path();
        let exists = git.succeeds(
            &GitCommand::new("cat-file")
                .arg("-e")
                .arg(format!("{commit}^{{commit}}"))
                .dir(repo),
        );
        let base_ref = format!("refs/heads/{}", ctx.pr.base_branch);
        if !exists || !is_ancestor(git, repo, &commit, &base_ref)? {
            return Err(invalid());
        }
        if let Ok(head) = rev_parse(git, repo, &ctx.pr.head_ref()) {
            if !is_ancestor(git, repo, &head, &commit)? {
                return Err(invalid());
            }
        }

        self.record_merge(
            ctx,
            &commit,
            doer.id,
            PullRequestStatus::ManuallyMerged,
            MergeStyle::ManuallyMerged,
        )?;
        Ok(commit)
    }

    /// Write the merge fields and close the issue in one transaction, then
    /// announce the merge and re-check the other pull requests on the branch.
    pub(crate) fn record_merge(
        &self,
        ctx: &PullContext,
        commit_id: &str,
        merger_id: i64,
        status: PullRequestStatus,
        style: MergeStyle,
    ) -> Result<()> {
        let pr_id = ctx.pr.id;
        let record = MergeRecord {
            commit_id: commit_id.to_string(),
            merger_id,
            merged_unix: chrono::Utc::now().timestamp(),
            status,
        };
        self.store.transaction(|data| {
            data.pull_request_mut(pr_id)?.mark_merged(record)?;
            data.issue_mut(ctx.issue.id)?.is_closed = true;
            Ok(())
        })?;
        info!(pr_id, commit = commit_id, %status, "pull request merged");

        self.notifier.notify(&PullRequestEvent::Merged {
            pr_id,
            repo_id: ctx.base_repo.id,
            base_branch: ctx.pr.base_branch.clone(),
            merged_commit_id: commit_id.to_string(),
            style,
            doer_id: merger_id,
        });

        if let Err(e) = self.on_base_pushed(ctx.base_repo.id, &ctx.pr.base_branch) {
            warn!(pr_id, "failed to re-enqueue pull requests after merge: {e}");
        }
        Ok(())
    }
}
