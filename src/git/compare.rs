//! Merge-base and commit comparison, possibly across repositories
//!
//! Comparing against another repository registers it as a temporary remote
//! and fetches the base ref into a disposable local ref. Both are removed
//! when the comparison ends, whatever the outcome.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::command::{GitCommand, GitRunner};
use super::tree::{merge_base, rev_parse};
use crate::error::{MergeError, Result};

/// The remote name that denotes "the base ref is already local".
pub const LOCAL_REMOTE: &str = "origin";

/// A commit as listed by a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub id: String,
    pub author_name: String,
    pub author_email: String,
    pub committed_unix: i64,
    pub subject: String,
}

/// Result of comparing a head ref against a base ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompareInfo {
    pub merge_base: String,
    pub base_commit_id: String,
    pub head_commit_id: String,
    /// Commits only on the head side, oldest first
    pub commits: Vec<CommitInfo>,
    pub num_files: usize,
}

/// Remote registered for one comparison, removed on drop.
struct TempRemote<'a> {
    git: &'a dyn GitRunner,
    repo: &'a Path,
    name: String,
}

impl<'a> TempRemote<'a> {
    fn add(git: &'a dyn GitRunner, repo: &'a Path, url: &Path) -> Result<Self> {
        let name = format!(
            "tmp-{}-{}",
            chrono::Utc::now().timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        git.checked(
            &GitCommand::new("remote")
                .args(["add", name.as_str()])
                .arg(url.to_string_lossy())
                .dir(repo),
        )?;
        Ok(Self { git, repo, name })
    }
}

impl Drop for TempRemote<'_> {
    fn drop(&mut self) {
        let cmd = GitCommand::new("remote")
            .args(["remove", self.name.as_str()])
            .dir(self.repo);
        if let Err(e) = self.git.checked(&cmd) {
            warn!(remote = %self.name, "failed to remove temporary remote: {e}");
        }
    }
}

/// Local ref holding a fetched base, deleted on drop.
struct TempRef<'a> {
    git: &'a dyn GitRunner,
    repo: &'a Path,
    name: String,
}

impl<'a> TempRef<'a> {
    fn fetch(git: &'a dyn GitRunner, repo: &'a Path, remote: &str, branch: &str) -> Result<Self> {
        let name = format!("refs/mergeq/tmp/{}", Uuid::new_v4().simple());
        let cmd = GitCommand::new("fetch")
            .args(["--no-tags", remote])
            .arg(format!("+{branch}:{name}"))
            .dir(repo);
        let output = git.output(&cmd)?;
        if !output.success() {
            return Err(output.into_error(&cmd, branch));
        }
        Ok(Self { git, repo, name })
    }
}

impl Drop for TempRef<'_> {
    fn drop(&mut self) {
        let cmd = GitCommand::new("update-ref")
            .args(["-d", self.name.as_str()])
            .dir(self.repo);
        if let Err(e) = self.git.checked(&cmd) {
            debug!(reference = %self.name, "failed to delete temporary ref: {e}");
        }
    }
}

/// Common ancestor of `base` and `head`, plus the commit `base` resolved to.
///
/// When `remote` is not [`LOCAL_REMOTE`] the base ref is fetched from that
/// remote first. No common ancestor is [`MergeError::NoMergeBase`].
pub fn get_merge_base(
    git: &dyn GitRunner,
    repo: &Path,
    remote: &str,
    base: &str,
    head: &str,
) -> Result<(String, String)> {
    let fetched = if remote != LOCAL_REMOTE {
        Some(TempRef::fetch(git, repo, remote, base)?)
    } else {
        None
    };
    let base_ref = fetched.as_ref().map(|r| r.name.as_str()).unwrap_or(base);

    let merge_base = merge_base(git, repo, base_ref, head)?.ok_or_else(|| MergeError::NoMergeBase {
        base: base.to_string(),
        head: head.to_string(),
    })?;
    let base_commit = rev_parse(git, repo, base_ref)?;
    Ok((merge_base, base_commit))
}

/// Resolve `rev` to a full id, or keep the raw string when it does not resolve.
fn resolve_or_raw(git: &dyn GitRunner, repo: &Path, rev: &str) -> Result<String> {
    match rev_parse(git, repo, rev) {
        Ok(id) => Ok(id),
        Err(MergeError::BranchNotFound { .. }) => Ok(rev.to_string()),
        Err(e) => Err(e),
    }
}

/// Commits selected by `range_args`, parsed from a NUL-separated log.
pub fn list_commits(git: &dyn GitRunner, repo: &Path, range_args: &[&str]) -> Result<Vec<CommitInfo>> {
    let output = git.checked_output(
        &GitCommand::new("log")
            .args(["-z", "--format=%H%x1f%an%x1f%ae%x1f%ct%x1f%s"])
            .args(range_args.iter().copied())
            .dir(repo),
    )?;
    Ok(output
        .nul_fields()
        .iter()
        .filter_map(|record| parse_commit_record(record))
        .collect())
}

fn parse_commit_record(record: &str) -> Option<CommitInfo> {
    let mut fields = record.trim_start_matches('\n').split('\u{1f}');
    Some(CommitInfo {
        id: fields.next()?.to_string(),
        author_name: fields.next()?.to_string(),
        author_email: fields.next()?.to_string(),
        committed_unix: fields.next()?.parse().unwrap_or(0),
        subject: fields.next().unwrap_or_default().to_string(),
    })
}

fn count_changed_files(git: &dyn GitRunner, repo: &Path, base: &str, sep: &str, head: &str) -> Result<usize> {
    let cmd = GitCommand::new("diff")
        .args(["-z", "--name-only"])
        .arg(format!("{base}{sep}{head}"))
        .dir(repo);
    let output = git.output(&cmd)?;
    if output.success() {
        return Ok(output.nul_fields().len());
    }
    if !output.stderr.contains("no merge base") {
        return Err(output.into_error(&cmd, base));
    }
    let fallback = git.checked_output(
        &GitCommand::new("diff")
            .args(["-z", "--name-only", base, head])
            .dir(repo),
    )?;
    Ok(fallback.nul_fields().len())
}

/// Compare `head_branch` of `repo` against `base_branch` of `base_path`.
///
/// # Arguments
/// * `repo` - Repository holding the head branch; commands run here
/// * `base_path` - Repository holding the base branch (may equal `repo`)
/// * `direct_comparison` - Use `base..head` instead of `base...head`
/// * `files_only` - Skip listing commits
pub fn get_compare_info(
    git: &dyn GitRunner,
    repo: &Path,
    base_path: &Path,
    base_branch: &str,
    head_branch: &str,
    direct_comparison: bool,
    files_only: bool,
) -> Result<CompareInfo> {
    let remote = if base_path != repo {
        Some(TempRemote::add(git, repo, base_path)?)
    } else {
        None
    };
    let fetched = match &remote {
        Some(r) => Some(TempRef::fetch(git, repo, &r.name, base_branch)?),
        None => None,
    };
    let base_ref = fetched.as_ref().map(|r| r.name.as_str()).unwrap_or(base_branch);

    let head_commit_id = resolve_or_raw(git, repo, head_branch)?;
    let base_commit_id = resolve_or_raw(git, repo, base_ref)?;

    let (merge_base, direct) = match merge_base(git, repo, base_ref, head_branch)? {
        Some(mb) => (mb, direct_comparison),
        None => {
            debug!(base = base_branch, head = head_branch, "no merge base, comparing directly");
            (base_commit_id.clone(), true)
        }
    };
    let sep = if direct { ".." } else { "..." };

    let commits = if files_only {
        Vec::new()
    } else {
        let range = format!("{base_ref}{sep}{head_branch}");
        let mut args = vec!["--reverse"];
        if !direct {
            args.push("--right-only");
        }
        args.push(range.as_str());
        list_commits(git, repo, &args)?
    };

    let num_files = count_changed_files(git, repo, base_ref, sep, head_branch)?;

    // Drop order: the fetched ref goes before its remote
    drop(fetched);
    drop(remote);

    Ok(CompareInfo {
        merge_base,
        base_commit_id,
        head_commit_id,
        commits,
        num_files,
    })
}
