//! Mergeability checks driven by the task queue

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::prepare::{Prepared, BASE, TRACKING};
use super::{MergeService, PullContext};
use crate::error::{MergeError, Result};
use crate::git::tree::{changed_files, count_commits, is_ancestor, three_way_merge, tree_of};
use crate::git::TrialMerge;
use crate::models::{MergeabilityReport, PullRequest, PullRequestStatus};
use crate::queue::{PushOutcome, TaskHandler, WorkerPool};

impl MergeService {
    /// Put the pull request back into `Checking` and bump its generation.
    ///
    /// Returns the generation a check started now must present when it
    /// finishes, or `None` for a merged pull request.
    pub fn begin_check(&self, pr_id: i64) -> Result<Option<u64>> {
        self.store
            .transaction(|data| Ok(data.pull_request_mut(pr_id)?.begin_check()))
    }

    /// Mark the pull request as needing a check and enqueue it.
    ///
    /// Returns `None` when the pull request is merged and was not enqueued.
    ///
    /// If the queue refuses the entry the previous status is put back, so
    /// the row is not left in `Checking` with nothing to test it.
    pub fn add_to_task_queue(&self, pr_id: i64) -> Result<Option<PushOutcome>> {
        let started = self.store.transaction(|data| {
            let pr = data.pull_request_mut(pr_id)?;
            let previous = pr.status;
            Ok(pr.begin_check().map(|generation| (generation, previous)))
        })?;
        let Some((generation, previous)) = started else {
            debug!(pr_id, "merged pull request not enqueued");
            return Ok(None);
        };
        match self.queue.push(pr_id) {
            Ok(outcome) => {
                debug!(pr_id, generation, ?outcome, "enqueued for mergeability check");
                Ok(Some(outcome))
            }
            Err(e) => {
                self.cancel_check(pr_id, generation, previous, |_| {});
                Err(e)
            }
        }
    }

    /// Restore `previous` after a failed enqueue. `undo` reverts any other
    /// field changed alongside `begin_check`, and only runs if the status
    /// was restored.
    pub(crate) fn cancel_check(
        &self,
        pr_id: i64,
        generation: u64,
        previous: PullRequestStatus,
        undo: impl FnOnce(&mut PullRequest),
    ) {
        let restored = self.store.transaction(|data| {
            let pr = data.pull_request_mut(pr_id)?;
            if !pr.cancel_check(generation, previous) {
                return Ok(false);
            }
            undo(pr);
            Ok(true)
        });
        match restored {
            Ok(true) => warn!(pr_id, status = %previous, "enqueue failed, status restored"),
            Ok(false) => warn!(pr_id, generation, "enqueue failed, newer check already started"),
            Err(e) => warn!(pr_id, "enqueue failed, status left as checking: {e}"),
        }
    }

    /// Persist a check result if `generation` is still current.
    ///
    /// Returns `false` when the result was discarded because the pull
    /// request merged or was re-enqueued after the check started.
    pub fn finish_check(&self, pr_id: i64, generation: u64, report: &MergeabilityReport) -> Result<bool> {
        let applied = self
            .store
            .transaction(|data| Ok(data.pull_request_mut(pr_id)?.apply_report(generation, report)))?;
        if applied {
            info!(pr_id, status = %report.status, "mergeability check finished");
        } else {
            debug!(pr_id, generation, "stale mergeability result discarded");
        }
        Ok(applied)
    }

    /// Run one mergeability check.
    ///
    /// Returns the status written, or `None` when nothing was written
    /// (already merged, or the result went stale).
    pub fn test_pull_request(&self, pr_id: i64) -> Result<Option<PullRequestStatus>> {
        let ctx = self.load_context(pr_id)?;
        if ctx.pr.has_merged {
            return Ok(None);
        }
        let generation = ctx.pr.check_generation;

        let prepared = match self.prepare_pull(&ctx) {
            Ok(p) => p,
            Err(e) => {
                warn!(pr_id, "could not prepare workspace: {e}");
                let report = MergeabilityReport::error();
                return self.finish_status(pr_id, generation, &report);
            }
        };

        if ctx.base_repo.settings.autodetect_manual_merge {
            match self.detect_manual_merge(&ctx, &prepared) {
                Ok(Some(found)) => {
                    drop(prepared);
                    return match self.record_manual_merge(&ctx, &found) {
                        Ok(()) => Ok(Some(PullRequestStatus::ManuallyMerged)),
                        Err(MergeError::AlreadyMerged { .. }) => Ok(None),
                        Err(e) => Err(e.context("manual merge detection", pr_id)),
                    };
                }
                Ok(None) => {}
                Err(e) => warn!(pr_id, "manual merge detection failed: {e}"),
            }
        }

        let report = match self.evaluate(&ctx, &prepared) {
            Ok(report) => report,
            Err(e) => {
                warn!(pr_id, transient = e.is_transient(), "mergeability check failed: {e}");
                MergeabilityReport::error()
            }
        };
        if let Err(e) = prepared.ws.close() {
            warn!(pr_id, "workspace cleanup failed: {e}");
        }
        self.finish_status(pr_id, generation, &report)
    }

    fn finish_status(
        &self,
        pr_id: i64,
        generation: u64,
        report: &MergeabilityReport,
    ) -> Result<Option<PullRequestStatus>> {
        Ok(self
            .finish_check(pr_id, generation, report)?
            .then_some(report.status))
    }

    /// Trial-merge the prepared head into base and describe the outcome.
    fn evaluate(&self, ctx: &PullContext, prepared: &Prepared) -> Result<MergeabilityReport> {
        let git = self.git.as_ref();
        let dir = prepared.dir();

        let commits_ahead = count_commits(git, dir, &format!("{BASE}..{TRACKING}"))?;
        let commits_behind = count_commits(git, dir, &format!("{TRACKING}..{BASE}"))?;
        let mut report = MergeabilityReport {
            commits_ahead,
            commits_behind,
            ..MergeabilityReport::error()
        };

        if is_ancestor(git, dir, TRACKING, BASE)? {
            report.status = PullRequestStatus::Ancestor;
            report.merge_base = prepared.head_commit.clone();
            return Ok(report);
        }

        match three_way_merge(git, dir, prepared.ws.scratch(), BASE, TRACKING)? {
            TrialMerge::Unrelated => {
                report.status = PullRequestStatus::Conflict;
            }
            TrialMerge::Conflict { files, merge_base } => {
                debug!(pr_id = ctx.pr.id, files = files.len(), "trial merge conflicts");
                report.status = PullRequestStatus::Conflict;
                report.conflicted_files = files;
                report.merge_base = merge_base;
            }
            TrialMerge::Clean { tree, merge_base } => {
                report.status = if tree == tree_of(git, dir, BASE)? {
                    PullRequestStatus::Empty
                } else {
                    PullRequestStatus::Mergeable
                };
                if let Some(rule) = &ctx.rule {
                    let changed = changed_files(git, dir, &merge_base, TRACKING)?;
                    report.changed_protected_files =
                        rule.protected_files(changed.iter().map(String::as_str));
                }
                report.merge_base = merge_base;
            }
        }
        Ok(report)
    }

    /// Test every queued pull request on the calling thread until the queue
    /// is empty. Returns how many were tested.
    pub fn drain_queue(&self) -> Result<usize> {
        let mut tested = 0;
        while let Some(pr_id) = self.queue.pop(Duration::ZERO)? {
            if let Err(e) = self.test_pull_request(pr_id) {
                warn!(pr_id, "mergeability check failed: {e}");
            }
            tested += 1;
        }
        Ok(tested)
    }

    /// Handler that tests each popped pull request.
    pub fn task_handler(self: &Arc<Self>) -> TaskHandler {
        let service = Arc::clone(self);
        Arc::new(move |pr_id| service.test_pull_request(pr_id).map(|_| ()))
    }

    /// Start the configured number of check workers.
    pub fn start_workers(self: &Arc<Self>) -> Result<WorkerPool> {
        WorkerPool::start(
            "pr-check",
            Arc::clone(&self.queue),
            self.config.queue.workers,
            self.task_handler(),
        )
    }

    /// Re-enqueue every pull request left in `Checking`, e.g. after a crash.
    ///
    /// The generation is left alone: no check can be in flight at startup.
    pub fn recover_checking(&self) -> Result<usize> {
        let ids = self.store.view(|data| Ok(data.checking_pull_requests()))?;
        let mut queued = 0;
        for pr_id in ids {
            if self.queue.push(pr_id)? == PushOutcome::Queued {
                queued += 1;
            }
        }
        info!(queued, "re-enqueued pull requests left in checking");
        Ok(queued)
    }
}
