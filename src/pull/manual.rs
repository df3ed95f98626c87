//! Detection of pull requests merged by a plain push to the base branch

use tracing::info;

use super::prepare::{Prepared, BASE, TRACKING};
use super::{MergeService, PullContext};
use crate::error::Result;
use crate::git::tree::{is_ancestor, parents};
use crate::git::GitCommand;
use crate::models::{MergeStyle, PullRequestStatus};

/// A merge found in the base branch history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ManualMerge {
    pub commit_id: String,
    pub merger_id: i64,
}

impl MergeService {
    /// Look for the commit that brought the head into the base branch.
    ///
    /// Returns `None` while the head is not yet contained in the base. When
    /// it is, the first merge commit on the ancestry path whose second-or-later
    /// parent contains the head is the merge; without one the head itself
    /// arrived by fast-forward.
    pub(crate) fn detect_manual_merge(
        &self,
        ctx: &PullContext,
        prepared: &Prepared,
    ) -> Result<Option<ManualMerge>> {
        let git = self.git.as_ref();
        let dir = prepared.dir();
        let head = prepared.head_commit.as_str();

        if !is_ancestor(git, dir, TRACKING, BASE)? {
            return Ok(None);
        }

        let candidates = git
            .checked_output(
                &GitCommand::new("rev-list")
                    .args(["--ancestry-path", "--merges", "--reverse"])
                    .arg(format!("{head}..{BASE}"))
                    .dir(dir),
            )?
            .lines();

        let mut commit_id = head.to_string();
        for candidate in candidates {
            let parent_ids = parents(git, dir, &candidate)?;
            let mut merged_by_candidate = false;
            for parent in parent_ids.iter().skip(1) {
                if is_ancestor(git, dir, head, parent)? {
                    merged_by_candidate = true;
                    break;
                }
            }
            if merged_by_candidate {
                commit_id = candidate;
                break;
            }
        }

        let author_email = git.checked(
            &GitCommand::new("log")
                .args(["-1", "--format=%ae", commit_id.as_str()])
                .dir(dir),
        )?;
        let merger_id = self.store.view(|data| {
            Ok(match data.user_by_email(&author_email) {
                Some(user) => user.id,
                None => {
                    info!(
                        pr_id = ctx.pr.id,
                        email = %author_email,
                        "merge author unknown, attributing to repository owner"
                    );
                    ctx.base_repo.owner_id
                }
            })
        })?;

        Ok(Some(ManualMerge {
            commit_id,
            merger_id,
        }))
    }

    pub(crate) fn record_manual_merge(&self, ctx: &PullContext, found: &ManualMerge) -> Result<()> {
        info!(pr_id = ctx.pr.id, commit = %found.commit_id, "pull request was merged manually");
        self.record_merge(
            ctx,
            &found.commit_id,
            found.merger_id,
            PullRequestStatus::ManuallyMerged,
            MergeStyle::ManuallyMerged,
        )
    }
}
