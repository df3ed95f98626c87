use std::path::Path;

use tracing::debug;

use super::{MergeService, PullContext};
use crate::error::{MergeError, Result};
use crate::git::tree::{rev_parse, update_ref};
use crate::git::{GitCommand, TempWorkspace};
use crate::models::PullRequestFlow;

/// Local branch the merge result is built on.
pub(crate) const BASE: &str = "base";
/// Local branch holding the commits being merged in.
pub(crate) const TRACKING: &str = "tracking";
/// Scratch branch used by rebases.
pub(crate) const STAGING: &str = "staging";

/// Where the tracking branch is fetched from.
pub(crate) enum Source<'a> {
    /// The clone's own origin
    Origin(&'a str),
    /// Another repository on disk
    Repo(&'a Path, &'a str),
}

/// A workspace with `base` and `tracking` set up.
pub(crate) struct Prepared {
    pub ws: TempWorkspace,
    pub base_commit: String,
    pub head_commit: String,
}

impl Prepared {
    pub fn dir(&self) -> &Path {
        self.ws.repo()
    }
}

impl MergeService {
    /// Clone `base_path` at `base_branch` into a fresh workspace and fetch
    /// `source` into the tracking branch.
    pub(crate) fn open_workspace(
        &self,
        base_path: &Path,
        base_branch: &str,
        source: Source<'_>,
    ) -> Result<Prepared> {
        let git = self.git.as_ref();
        let ws = TempWorkspace::new(&self.config.workspace.temp_root())?;
        ws.clone_branch(git, base_path, base_branch)?;
        let dir = ws.repo();

        let base_commit = rev_parse(git, dir, "HEAD")?;
        update_ref(git, dir, &format!("refs/heads/{BASE}"), &base_commit)?;
        update_ref(git, dir, "refs/heads/original_base", &base_commit)?;
        git.checked(
            &GitCommand::new("symbolic-ref")
                .arg("HEAD")
                .arg(format!("refs/heads/{BASE}"))
                .dir(dir),
        )?;

        let (remote, refname, branch) = match source {
            Source::Origin(refname) => ("origin".to_string(), refname.to_string(), refname),
            Source::Repo(path, branch) => (
                path.to_string_lossy().into_owned(),
                format!("refs/heads/{branch}"),
                branch,
            ),
        };
        let cmd = GitCommand::new("fetch")
            .args(["--no-tags", remote.as_str()])
            .arg(format!("+{refname}:refs/heads/{TRACKING}"))
            .dir(dir);
        let output = git.output(&cmd)?;
        if !output.success() {
            if output.stderr.contains("couldn't find remote ref") {
                return Err(MergeError::BranchNotFound {
                    branch: branch.to_string(),
                });
            }
            return Err(output.into_error(&cmd, &remote));
        }

        let head_commit = rev_parse(git, dir, TRACKING)?;
        debug!(base = %base_commit, head = %head_commit, "workspace prepared");
        Ok(Prepared {
            ws,
            base_commit,
            head_commit,
        })
    }

    /// Workspace for merging a pull request into its base branch.
    pub(crate) fn prepare_pull(&self, ctx: &PullContext) -> Result<Prepared> {
        let head_ref = ctx.pr.head_ref();
        let source = match ctx.pr.flow {
            PullRequestFlow::Agit => Source::Origin(&head_ref),
            PullRequestFlow::Fork => Source::Repo(&ctx.head_repo.path, &ctx.pr.head_branch),
        };
        self.open_workspace(&ctx.base_repo.path, &ctx.pr.base_branch, source)
    }

    /// Current head commit, read straight from the repository holding it.
    pub fn head_commit_id(&self, ctx: &PullContext) -> Result<String> {
        let git = self.git.as_ref();
        match ctx.pr.flow {
            PullRequestFlow::Agit => rev_parse(git, &ctx.base_repo.path, &ctx.pr.head_ref()),
            PullRequestFlow::Fork => rev_parse(
                git,
                &ctx.head_repo.path,
                &format!("refs/heads/{}", ctx.pr.head_branch),
            ),
        }
    }
}
