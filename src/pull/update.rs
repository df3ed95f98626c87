//! Bringing the base branch into a pull request's head branch

use tracing::{info, warn};

use super::merge::{rebase_onto, update_message};
use super::prepare::{Source, BASE, STAGING, TRACKING};
use super::MergeService;
use crate::error::{MergeError, NotAllowedReason, Result};
use crate::git::env::{identity_env, internal_push_env};
use crate::git::tree::{commit_tree, count_commits, three_way_merge, update_ref};
use crate::git::{push, TrialMerge};
use crate::models::{MergeStyle, PullRequestFlow};

impl MergeService {
    /// Merge (or with `rebase`, rebase) the base branch into the head branch
    /// and push the result to the head repository.
    ///
    /// Returns `false` when the head already contains the base branch and
    /// nothing was pushed.
    pub fn update(
        &self,
        pr_id: i64,
        doer_id: i64,
        message: Option<String>,
        rebase: bool,
    ) -> Result<bool> {
        self.with_pr_lock(pr_id, || self.update_locked(pr_id, doer_id, message, rebase))
    }

    fn update_locked(
        &self,
        pr_id: i64,
        doer_id: i64,
        message: Option<String>,
        rebase: bool,
    ) -> Result<bool> {
        let ctx = self.load_context(pr_id)?;
        if ctx.pr.flow == PullRequestFlow::Agit {
            return Err(MergeError::UpdateNotSupported {
                pr_id,
                reason: "head was pushed as a ref, not a branch".to_string(),
            });
        }
        if ctx.pr.has_merged {
            return Err(MergeError::AlreadyMerged { pr_id });
        }

        let (doer, permission, head_rule) = self.store.view(|data| {
            Ok((
                data.user(doer_id)?.clone(),
                data.permission(ctx.pr.head_repo_id, doer_id),
                data.protected_branch(ctx.pr.head_repo_id, &ctx.pr.head_branch)
                    .cloned(),
            ))
        })?;
        if !permission.can_write() {
            return Err(MergeError::NotAllowedToMerge {
                reason: NotAllowedReason::NoPermission,
            });
        }
        let signing = self.signing_for(head_rule.as_ref(), &doer)?;

        // The clone is of the head branch; the base branch is the tracking side.
        let prepared = self.open_workspace(
            &ctx.head_repo.path,
            &ctx.pr.head_branch,
            Source::Repo(&ctx.base_repo.path, &ctx.pr.base_branch),
        )?;
        let git = self.git.as_ref();
        let dir = prepared.dir();

        let behind = count_commits(git, dir, &format!("{BASE}..{TRACKING}"))?;
        if behind == 0 {
            info!(pr_id, "head already contains base, nothing to update");
            return Ok(false);
        }

        let old_head = prepared.base_commit.clone();
        let refspec_target = format!("refs/heads/{}", ctx.pr.head_branch);
        let push_env = internal_push_env(&doer, pr_id, &ctx.head_repo.full_name());

        let new_head = if rebase {
            let env = identity_env(&doer, &doer);
            let rebased = rebase_onto(git, &prepared, BASE, TRACKING, &signing, &env)?;
            let lease = format!("{refspec_target}:{old_head}");
            push(
                git,
                dir,
                "origin",
                &format!("{STAGING}:{refspec_target}"),
                Some(&lease),
                push_env,
            )?;
            rebased
        } else {
            let tree = match three_way_merge(git, dir, prepared.ws.scratch(), BASE, TRACKING)? {
                TrialMerge::Clean { tree, .. } => tree,
                TrialMerge::Conflict { files, .. } => {
                    return Err(MergeError::Conflict {
                        style: MergeStyle::Merge,
                        files,
                    })
                }
                TrialMerge::Unrelated => return Err(MergeError::UnrelatedHistories),
            };
            let message = message.unwrap_or_else(|| update_message(&ctx.pr));
            let commit = commit_tree(
                git,
                dir,
                &tree,
                &[old_head.as_str(), prepared.head_commit.as_str()],
                &message,
                &signing,
                identity_env(&doer, &doer),
            )?;
            update_ref(git, dir, &format!("refs/heads/{BASE}"), &commit)?;
            push(git, dir, "origin", &format!("HEAD:{refspec_target}"), None, push_env)?;
            commit
        };

        if let Err(e) = prepared.ws.close() {
            warn!(pr_id, "workspace cleanup failed: {e}");
        }
        info!(pr_id, rebase, old = %old_head, new = %new_head, "head branch updated");

        self.on_head_pushed(
            ctx.pr.head_repo_id,
            &ctx.pr.head_branch,
            &old_head,
            &new_head,
            doer_id,
        )?;
        Ok(true)
    }
}
