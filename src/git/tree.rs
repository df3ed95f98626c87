//! Index, tree and commit plumbing
//!
//! The trial merge never touches a working tree: it runs a three-way
//! `read-tree` into the workspace index, resolves the unmerged paths one by
//! one with `merge-file`, and writes the resulting tree. The same tree is
//! what the merge and squash styles commit.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use super::command::{GitCommand, GitRunner};
use super::env::CommitSigning;
use crate::error::{MergeError, Result};

/// Outcome of a three-way merge of `head` into `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialMerge {
    Clean { tree: String, merge_base: String },
    Conflict { files: Vec<String>, merge_base: String },
    /// No common ancestor
    Unrelated,
}

/// Resolve a revision to a full object id.
pub fn rev_parse(git: &dyn GitRunner, dir: &Path, rev: &str) -> Result<String> {
    let output = git.output(
        &GitCommand::new("rev-parse")
            .args(["--verify", "--quiet"])
            .arg(rev)
            .dir(dir),
    )?;
    if output.success() {
        Ok(output.text())
    } else {
        Err(MergeError::BranchNotFound {
            branch: rev.to_string(),
        })
    }
}

/// Tree id of a commit.
pub fn tree_of(git: &dyn GitRunner, dir: &Path, rev: &str) -> Result<String> {
    rev_parse(git, dir, &format!("{rev}^{{tree}}"))
}

/// Common ancestor of two revisions, `None` for unrelated histories.
pub fn merge_base(git: &dyn GitRunner, dir: &Path, base: &str, head: &str) -> Result<Option<String>> {
    let cmd = GitCommand::new("merge-base").args(["--", base, head]).dir(dir);
    let output = git.output(&cmd)?;
    match output.code {
        Some(0) => Ok(Some(output.text())),
        Some(1) if output.stderr.trim().is_empty() => Ok(None),
        _ => Err(output.into_error(&cmd, base)),
    }
}

/// Is `ancestor` reachable from `descendant`?
pub fn is_ancestor(git: &dyn GitRunner, dir: &Path, ancestor: &str, descendant: &str) -> Result<bool> {
    let cmd = GitCommand::new("merge-base")
        .args(["--is-ancestor", ancestor, descendant])
        .dir(dir);
    let output = git.output(&cmd)?;
    match output.code {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => Err(output.into_error(&cmd, ancestor)),
    }
}

/// Number of commits in a revision range.
pub fn count_commits(git: &dyn GitRunner, dir: &Path, range: &str) -> Result<u32> {
    let text = git.checked(&GitCommand::new("rev-list").args(["--count", range]).dir(dir))?;
    text.parse().map_err(|_| MergeError::Git {
        command: format!("rev-list --count {range}"),
        code: Some(0),
        stderr: format!("unexpected output '{text}'"),
    })
}

/// Paths that differ between two revisions.
pub fn changed_files(git: &dyn GitRunner, dir: &Path, from: &str, to: &str) -> Result<Vec<String>> {
    let output = git.checked_output(
        &GitCommand::new("diff")
            .args(["-z", "--name-only", from, to])
            .dir(dir),
    )?;
    Ok(output.nul_fields())
}

/// Parent ids of a commit, first parent first.
pub fn parents(git: &dyn GitRunner, dir: &Path, commit: &str) -> Result<Vec<String>> {
    let text = git.checked(
        &GitCommand::new("rev-list")
            .args(["--parents", "-n", "1", commit])
            .dir(dir),
    )?;
    Ok(text.split_whitespace().skip(1).map(str::to_string).collect())
}

pub fn write_blob(git: &dyn GitRunner, dir: &Path, content: &[u8]) -> Result<String> {
    git.checked(
        &GitCommand::new("hash-object")
            .args(["-w", "--stdin"])
            .stdin(content.to_vec())
            .dir(dir),
    )
}

pub fn read_blob(git: &dyn GitRunner, dir: &Path, id: &str) -> Result<Vec<u8>> {
    Ok(git
        .checked_output(&GitCommand::new("cat-file").args(["blob", id]).dir(dir))?
        .stdout)
}

/// Create a commit object. The message is passed on stdin.
pub fn commit_tree(
    git: &dyn GitRunner,
    dir: &Path,
    tree: &str,
    parent_ids: &[&str],
    message: &str,
    signing: &CommitSigning,
    env: Vec<(String, String)>,
) -> Result<String> {
    let mut cmd = GitCommand::new("commit-tree").arg(tree);
    for parent in parent_ids {
        cmd = cmd.args(["-p", *parent]);
    }
    let cmd = cmd
        .arg(signing.arg())
        .stdin(message.as_bytes().to_vec())
        .envs(env)
        .dir(dir);
    git.checked(&cmd)
}

pub fn update_ref(git: &dyn GitRunner, dir: &Path, name: &str, value: &str) -> Result<()> {
    git.checked(&GitCommand::new("update-ref").args([name, value]).dir(dir))
        .map(|_| ())
}

/// One stage of an unmerged index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StageEntry {
    mode: String,
    id: String,
}

#[derive(Debug, Default)]
struct Unmerged {
    base: Option<StageEntry>,
    ours: Option<StageEntry>,
    theirs: Option<StageEntry>,
}

/// Parse `ls-files -u -z` records: `<mode> <id> <stage>\t<path>`.
fn parse_unmerged(fields: &[String]) -> BTreeMap<String, Unmerged> {
    let mut paths: BTreeMap<String, Unmerged> = BTreeMap::new();
    for record in fields {
        let Some((meta, path)) = record.split_once('\t') else {
            continue;
        };
        let mut parts = meta.split_whitespace();
        let (Some(mode), Some(id), Some(stage)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let entry = StageEntry {
            mode: mode.to_string(),
            id: id.to_string(),
        };
        let slot = paths.entry(path.to_string()).or_default();
        match stage {
            "1" => slot.base = Some(entry),
            "2" => slot.ours = Some(entry),
            "3" => slot.theirs = Some(entry),
            _ => {}
        }
    }
    paths
}

fn stage_resolved(git: &dyn GitRunner, dir: &Path, path: &str, entry: &StageEntry) -> Result<()> {
    git.checked(
        &GitCommand::new("update-index")
            .args(["--add", "--replace", "--cacheinfo"])
            .args([entry.mode.as_str(), entry.id.as_str(), path])
            .dir(dir),
    )
    .map(|_| ())
}

fn remove_path(git: &dyn GitRunner, dir: &Path, path: &str) -> Result<()> {
    git.checked(
        &GitCommand::new("update-index")
            .args(["--force-remove", "--", path])
            .dir(dir),
    )
    .map(|_| ())
}

fn is_regular_file(mode: &str) -> bool {
    matches!(mode, "100644" | "100755")
}

/// Try to resolve one unmerged path. Returns `false` on a real conflict.
fn resolve_path(
    git: &dyn GitRunner,
    dir: &Path,
    scratch: &Path,
    path: &str,
    entry: &Unmerged,
) -> Result<bool> {
    match (&entry.base, &entry.ours, &entry.theirs) {
        // Both sides made the same change
        (_, Some(ours), Some(theirs)) if ours == theirs => {
            stage_resolved(git, dir, path, ours)?;
            Ok(true)
        }
        // Deleted on both sides
        (Some(_), None, None) => {
            remove_path(git, dir, path)?;
            Ok(true)
        }
        // Deleted on one side, untouched on the other
        (Some(base), Some(kept), None) | (Some(base), None, Some(kept)) if base.id == kept.id => {
            remove_path(git, dir, path)?;
            Ok(true)
        }
        // Submodules and symlinks changed differently on both sides
        (base, Some(ours), Some(theirs))
            if !is_regular_file(&ours.mode)
                || !is_regular_file(&theirs.mode)
                || base.as_ref().is_some_and(|b| !is_regular_file(&b.mode)) =>
        {
            Ok(false)
        }
        (base, Some(ours), Some(theirs)) => {
            // A mode change on one side wins over the unchanged side
            let mode = match base {
                _ if ours.mode == theirs.mode => ours.mode.clone(),
                Some(b) if b.mode == ours.mode => theirs.mode.clone(),
                Some(b) if b.mode == theirs.mode => ours.mode.clone(),
                _ => return Ok(false),
            };
            let base_file = scratch.join("base");
            let ours_file = scratch.join("ours");
            let theirs_file = scratch.join("theirs");
            match base {
                Some(b) => fs::write(&base_file, read_blob(git, dir, &b.id)?)?,
                None => fs::write(&base_file, b"")?,
            }
            fs::write(&ours_file, read_blob(git, dir, &ours.id)?)?;
            fs::write(&theirs_file, read_blob(git, dir, &theirs.id)?)?;

            let output = git.output(
                &GitCommand::new("merge-file")
                    .arg("-p")
                    .arg(ours_file.to_string_lossy())
                    .arg(base_file.to_string_lossy())
                    .arg(theirs_file.to_string_lossy())
                    .dir(dir),
            )?;
            match output.code {
                Some(0) => {
                    let id = write_blob(git, dir, &output.stdout)?;
                    stage_resolved(git, dir, path, &StageEntry { mode, id })?;
                    Ok(true)
                }
                Some(code) if code > 0 => Ok(false),
                _ => Err(MergeError::Git {
                    command: "merge-file -p".to_string(),
                    code: output.code,
                    stderr: output.stderr,
                }),
            }
        }
        _ => Ok(false),
    }
}

/// Three-way merge of `head` into `base` in the workspace index.
///
/// # Arguments
/// * `dir` - Clone whose index may be overwritten
/// * `scratch` - Directory for temporary blob files
/// * `base` / `head` - Revisions in that clone
pub fn three_way_merge(
    git: &dyn GitRunner,
    dir: &Path,
    scratch: &Path,
    base: &str,
    head: &str,
) -> Result<TrialMerge> {
    let Some(mb) = merge_base(git, dir, base, head)? else {
        return Ok(TrialMerge::Unrelated);
    };

    // The index must match `base` before a three-tree read
    git.checked(&GitCommand::new("read-tree").arg(base).dir(dir))?;
    let read = git.output(
        &GitCommand::new("read-tree")
            .args(["-m", mb.as_str(), base, head])
            .dir(dir),
    )?;
    if !read.success() {
        debug!(stderr = %read.stderr.trim(), "read-tree failed, falling back to patch check");
        let files = conflicts_by_patch(git, dir, base, head)?;
        if files.is_empty() {
            return Err(MergeError::Git {
                command: "read-tree -m".to_string(),
                code: read.code,
                stderr: read.stderr,
            });
        }
        return Ok(TrialMerge::Conflict {
            files,
            merge_base: mb,
        });
    }

    let unmerged = git.checked_output(&GitCommand::new("ls-files").args(["-u", "-z"]).dir(dir))?;
    let mut conflicts = Vec::new();
    for (path, entry) in parse_unmerged(&unmerged.nul_fields()) {
        if !resolve_path(git, dir, scratch, &path, &entry)? {
            conflicts.push(path);
        }
    }
    if !conflicts.is_empty() {
        return Ok(TrialMerge::Conflict {
            files: conflicts,
            merge_base: mb,
        });
    }

    let tree = git.checked(&GitCommand::new("write-tree").dir(dir))?;
    Ok(TrialMerge::Clean {
        tree,
        merge_base: mb,
    })
}

/// Files whose patches do not apply cleanly on top of `base`.
///
/// Pipes `format-patch base..head` into `apply --check --cached` against an
/// index reset to `base`.
pub fn conflicts_by_patch(git: &dyn GitRunner, dir: &Path, base: &str, head: &str) -> Result<Vec<String>> {
    let patch = git.checked_output(
        &GitCommand::new("format-patch")
            .args(["--binary", "--stdout"])
            .arg(format!("{base}..{head}"))
            .dir(dir),
    )?;
    git.checked(&GitCommand::new("read-tree").arg(base).dir(dir))?;

    let check = git.output(
        &GitCommand::new("apply")
            .args(["--check", "--cached"])
            .stdin(patch.stdout)
            .dir(dir),
    )?;
    if check.success() {
        return Ok(Vec::new());
    }
    Ok(parse_apply_conflicts(&check.stderr))
}

fn parse_apply_conflicts(stderr: &str) -> Vec<String> {
    const PATCH_FAILED: &str = "error: patch failed: ";
    let mut files: Vec<String> = Vec::new();
    for line in stderr.lines() {
        let file = if let Some(rest) = line.strip_prefix(PATCH_FAILED) {
            rest.rsplit_once(':').map(|(f, _)| f).unwrap_or(rest)
        } else if let Some(rest) = line.strip_prefix("error: ") {
            match rest.split_once(": ") {
                Some((f, reason))
                    if reason.contains("does not exist in index")
                        || reason.contains("already exists in index") =>
                {
                    f
                }
                _ => continue,
            }
        } else {
            continue;
        };
        if !files.iter().any(|f| f == file) {
            files.push(file.to_string());
        }
    }
    files
}
