//! Building the merge result for each merge style inside a workspace
//!
//! Every function leaves the result on the local `base` branch with HEAD
//! pointing at it, ready to be pushed.

use std::path::Path;

use tracing::debug;

use crate::error::{MergeError, Result};
use crate::git::env::CommitSigning;
use crate::git::tree::{commit_tree, rev_parse, three_way_merge, update_ref};
use crate::git::{GitCommand, GitRunner, TrialMerge};
use crate::models::MergeStyle;
use crate::pull::prepare::{Prepared, BASE, STAGING, TRACKING};

/// Tree of merging `tracking` into `base`, or the typed conflict.
fn merged_tree(git: &dyn GitRunner, prepared: &Prepared, style: MergeStyle) -> Result<String> {
    match three_way_merge(git, prepared.dir(), prepared.ws.scratch(), BASE, TRACKING)? {
        TrialMerge::Clean { tree, .. } => Ok(tree),
        TrialMerge::Conflict { files, .. } => Err(MergeError::Conflict { style, files }),
        TrialMerge::Unrelated => Err(MergeError::UnrelatedHistories),
    }
}

fn advance_base(git: &dyn GitRunner, dir: &Path, commit: &str) -> Result<()> {
    update_ref(git, dir, &format!("refs/heads/{BASE}"), commit)
}

/// Two-parent merge commit `(base, head)`.
pub(crate) fn merge_commit(
    git: &dyn GitRunner,
    prepared: &Prepared,
    message: &str,
    signing: &CommitSigning,
    env: Vec<(String, String)>,
) -> Result<String> {
    let tree = merged_tree(git, prepared, MergeStyle::Merge)?;
    let commit = commit_tree(
        git,
        prepared.dir(),
        &tree,
        &[prepared.base_commit.as_str(), prepared.head_commit.as_str()],
        message,
        signing,
        env,
    )?;
    advance_base(git, prepared.dir(), &commit)?;
    Ok(commit)
}

/// Single commit on top of base with the merged tree.
pub(crate) fn squash_commit(
    git: &dyn GitRunner,
    prepared: &Prepared,
    message: &str,
    signing: &CommitSigning,
    env: Vec<(String, String)>,
) -> Result<String> {
    let tree = merged_tree(git, prepared, MergeStyle::Squash)?;
    let commit = commit_tree(
        git,
        prepared.dir(),
        &tree,
        &[prepared.base_commit.as_str()],
        message,
        signing,
        env,
    )?;
    advance_base(git, prepared.dir(), &commit)?;
    Ok(commit)
}

/// Files git reports as unmerged after a stopped rebase.
fn unmerged_files(git: &dyn GitRunner, dir: &Path) -> Vec<String> {
    git.checked_output(
        &GitCommand::new("diff")
            .args(["-z", "--name-only", "--diff-filter=U"])
            .dir(dir),
    )
    .map(|o| o.nul_fields())
    .unwrap_or_default()
}

/// Replay `start` onto `upstream` on the staging branch.
///
/// A rebase that stops on a conflict is aborted and reported as
/// [`MergeError::RebaseConflict`] naming the commit that failed to apply.
pub(crate) fn rebase_onto(
    git: &dyn GitRunner,
    prepared: &Prepared,
    start: &str,
    upstream: &str,
    signing: &CommitSigning,
    env: &[(String, String)],
) -> Result<String> {
    let dir = prepared.dir();
    git.checked(
        &GitCommand::new("checkout")
            .args(["-q", "-f", "-B", STAGING, start])
            .dir(dir),
    )?;

    let cmd = GitCommand::new("rebase")
        .arg("-q")
        .arg(signing.arg())
        .arg(upstream)
        .envs(env.iter().cloned())
        .dir(dir);
    let output = git.output(&cmd)?;
    if !output.success() {
        let in_progress = prepared.ws.git_path("rebase-merge").exists()
            || prepared.ws.git_path("rebase-apply").exists();
        if !in_progress {
            return Err(output.into_error(&cmd, upstream));
        }
        let files = unmerged_files(git, dir);
        let commit = rev_parse(git, dir, "REBASE_HEAD").unwrap_or_default();
        if !git.succeeds(&GitCommand::new("rebase").arg("--abort").dir(dir)) {
            debug!("rebase --abort failed after conflict");
        }
        return Err(MergeError::RebaseConflict { commit, files });
    }
    rev_parse(git, dir, STAGING)
}

/// Rebase head onto base, then fast-forward (`Rebase`) or merge with
/// `--no-ff` (`RebaseMerge`).
pub(crate) fn rebase_and_land(
    git: &dyn GitRunner,
    prepared: &Prepared,
    style: MergeStyle,
    message: &str,
    signing: &CommitSigning,
    env: Vec<(String, String)>,
) -> Result<String> {
    let dir = prepared.dir();
    rebase_onto(git, prepared, TRACKING, BASE, signing, &env)?;

    git.checked(&GitCommand::new("checkout").args(["-q", "-f", BASE]).dir(dir))?;
    let cmd = match style {
        MergeStyle::RebaseMerge => GitCommand::new("merge")
            .args(["-q", "--no-ff"])
            .arg(signing.arg())
            .args(["-m", message, STAGING]),
        _ => GitCommand::new("merge").args(["-q", "--ff-only", STAGING]),
    };
    git.checked(&cmd.envs(env).dir(dir))?;
    rev_parse(git, dir, "HEAD")
}
