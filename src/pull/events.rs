//! Reactions to pushes and target-branch changes

use tracing::{debug, info, warn};

use super::{MergeService, PullContext};
use crate::error::{MergeError, NotAllowedReason, Result};
use crate::git::tree::{rev_parse, update_ref};
use crate::git::{get_compare_info, CompareInfo, GitCommand};
use crate::models::PullRequestFlow;
use crate::notify::PullRequestEvent;

impl MergeService {
    /// A branch was pushed: re-test pull requests whose head or base it is.
    ///
    /// Returns the ids that were re-enqueued.
    pub fn on_push(
        &self,
        repo_id: i64,
        branch: &str,
        before: &str,
        after: &str,
        doer_id: i64,
    ) -> Result<Vec<i64>> {
        let mut ids = self.on_head_pushed(repo_id, branch, before, after, doer_id)?;
        ids.extend(self.on_base_pushed(repo_id, branch)?);
        Ok(ids)
    }

    /// New commits on a head branch.
    ///
    /// For each open pull request with this head: sync `refs/pull/<n>/head`
    /// in the base repository, mark reviews stale, re-enqueue and emit
    /// [`PullRequestEvent::Synchronized`].
    pub fn on_head_pushed(
        &self,
        repo_id: i64,
        branch: &str,
        before: &str,
        after: &str,
        doer_id: i64,
    ) -> Result<Vec<i64>> {
        let ids = self
            .store
            .view(|data| Ok(data.open_pull_requests_by_head(repo_id, branch)))?;

        let mut queued = Vec::new();
        for &pr_id in &ids {
            let ctx = self.load_context(pr_id)?;
            if ctx.pr.flow == PullRequestFlow::Fork {
                if let Err(e) = self.sync_head_ref(&ctx, after) {
                    warn!(pr_id, "failed to sync head ref: {e}");
                }
            }
            self.store.transaction(|data| {
                data.mark_reviews_stale(ctx.issue.id);
                Ok(())
            })?;
            if self.add_to_task_queue(pr_id)?.is_some() {
                queued.push(pr_id);
            }
            self.notifier.notify(&PullRequestEvent::Synchronized {
                pr_id,
                before: before.to_string(),
                after: after.to_string(),
                doer_id,
            });
        }
        debug!(repo_id, branch, count = queued.len(), "head push handled");
        Ok(queued)
    }

    /// New commits on a base branch: every open pull request targeting it
    /// needs a fresh check.
    pub fn on_base_pushed(&self, repo_id: i64, branch: &str) -> Result<Vec<i64>> {
        let ids = self
            .store
            .view(|data| Ok(data.open_pull_requests_by_base(repo_id, branch)))?;
        let mut queued = Vec::new();
        for pr_id in ids {
            if self.add_to_task_queue(pr_id)?.is_some() {
                queued.push(pr_id);
            }
        }
        debug!(repo_id, branch, count = queued.len(), "base push handled");
        Ok(queued)
    }

    /// Point `refs/pull/<n>/head` in the base repository at the head commit.
    fn sync_head_ref(&self, ctx: &PullContext, after: &str) -> Result<()> {
        let git = self.git.as_ref();
        let head_ref = ctx.pr.head_ref();
        if ctx.pr.is_same_repo() {
            return update_ref(git, &ctx.base_repo.path, &head_ref, after);
        }
        git.checked(
            &GitCommand::new("fetch")
                .args(["--no-tags", "-q"])
                .arg(ctx.head_repo.path.to_string_lossy().into_owned())
                .arg(format!("+refs/heads/{}:{head_ref}", ctx.pr.head_branch))
                .dir(&ctx.base_repo.path),
        )?;
        Ok(())
    }

    /// Retarget a pull request at another branch of its base repository.
    pub fn change_target_branch(&self, pr_id: i64, doer_id: i64, new_branch: &str) -> Result<()> {
        let ctx = self.load_context(pr_id)?;
        if ctx.pr.has_merged {
            return Err(MergeError::AlreadyMerged { pr_id });
        }
        let permission = self
            .store
            .view(|data| Ok(data.permission(ctx.pr.base_repo_id, doer_id)))?;
        if doer_id != ctx.issue.poster_id && !permission.can_write() {
            return Err(MergeError::NotAllowedToMerge {
                reason: NotAllowedReason::NoPermission,
            });
        }

        let invalid = |reason: &str| MergeError::InvalidTargetBranch {
            branch: new_branch.to_string(),
            reason: reason.to_string(),
        };
        if new_branch == ctx.pr.base_branch {
            return Err(invalid("already the target branch"));
        }
        match rev_parse(self.git.as_ref(), &ctx.base_repo.path, &format!("refs/heads/{new_branch}")) {
            Ok(_) => {}
            Err(MergeError::BranchNotFound { .. }) => return Err(invalid("branch does not exist")),
            Err(e) => return Err(e),
        }
        if ctx.pr.is_same_repo() && ctx.pr.head_branch == new_branch {
            return Err(invalid("same as the head branch"));
        }
        let duplicate = self.store.view(|data| {
            Ok(data
                .open_pull_requests_by_base(ctx.pr.base_repo_id, new_branch)
                .into_iter()
                .filter_map(|id| data.pull_request(id).ok())
                .any(|other| {
                    other.head_repo_id == ctx.pr.head_repo_id
                        && other.head_branch == ctx.pr.head_branch
                        && other.flow == ctx.pr.flow
                }))
        })?;
        if duplicate {
            return Err(invalid("an open pull request already exists for this branch"));
        }

        let old_branch = ctx.pr.base_branch.clone();
        let (generation, previous) = self.store.transaction(|data| {
            let pr = data.pull_request_mut(pr_id)?;
            let previous = pr.status;
            pr.base_branch = new_branch.to_string();
            Ok((pr.begin_check(), previous))
        })?;
        if let Err(e) = self.queue.push(pr_id) {
            if let Some(generation) = generation {
                self.cancel_check(pr_id, generation, previous, |pr| {
                    pr.base_branch = old_branch.clone();
                });
            }
            return Err(e);
        }
        info!(pr_id, old = %old_branch, new = %new_branch, "target branch changed");

        self.notifier.notify(&PullRequestEvent::TargetBranchChanged {
            pr_id,
            old_branch,
            new_branch: new_branch.to_string(),
            doer_id,
        });
        Ok(())
    }

    /// Commits and changed-file count between the base and head branches.
    pub fn compare(&self, pr_id: i64, direct: bool, files_only: bool) -> Result<CompareInfo> {
        let ctx = self.load_context(pr_id)?;
        let git = self.git.as_ref();
        match ctx.pr.flow {
            PullRequestFlow::Fork => get_compare_info(
                git,
                &ctx.head_repo.path,
                &ctx.base_repo.path,
                &ctx.pr.base_branch,
                &ctx.pr.head_branch,
                direct,
                files_only,
            ),
            PullRequestFlow::Agit => get_compare_info(
                git,
                &ctx.base_repo.path,
                &ctx.base_repo.path,
                &ctx.pr.base_branch,
                &ctx.pr.head_ref(),
                direct,
                files_only,
            ),
        }
        .map_err(|e| e.context("compare", pr_id))
    }
}
