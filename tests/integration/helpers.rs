//! Shared helpers: real git repositories and a wired-up service
//!
//! Every fixture has a bare `base.git` (the canonical repository) and a
//! `work` clone used to author commits and push them.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use mergeq::config::MergeConfig;
use mergeq::git::{GitRunner, RecordingGit, SystemGit};
use mergeq::models::{
    AccessMode, Issue, PullRequest, PullRequestStatus, RepoSettings, Repository, User,
};
use mergeq::notify::{ChannelNotifier, PullRequestEvent};
use mergeq::process::{CancelToken, ProcessRunner};
use mergeq::queue::MemoryQueue;
use mergeq::store::Store;
use mergeq::MergeService;

pub const REPO: i64 = 10;
pub const FORK: i64 = 11;
pub const OWNER: i64 = 1;
pub const POSTER: i64 = 2;
pub const WRITER: i64 = 3;

pub struct Fixture {
    pub tmp: TempDir,
    pub base: PathBuf,
    pub work: PathBuf,
    pub service: Arc<MergeService>,
    pub recorder: Arc<RecordingGit>,
    pub events: Receiver<PullRequestEvent>,
}

/// Run git in `dir` with a fixed identity and no signing; panics on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    git_as(dir, args, "Test User", "test@example.com")
}

pub fn git_as(dir: &Path, args: &[&str], name: &str, email: &str) -> String {
    let output = Command::new("git")
        .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=main"])
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", name)
        .env("GIT_AUTHOR_EMAIL", email)
        .env("GIT_COMMITTER_NAME", name)
        .env("GIT_COMMITTER_EMAIL", email)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Check out `branch` in the work clone (creating it from the current HEAD
/// when missing), commit `content` to `file` and push the branch.
pub fn commit_file(work: &Path, branch: &str, file: &str, content: &str, message: &str) -> String {
    commit_file_as(work, branch, file, content, message, "Test User", "test@example.com")
}

pub fn commit_file_as(
    work: &Path,
    branch: &str,
    file: &str,
    content: &str,
    message: &str,
    name: &str,
    email: &str,
) -> String {
    checkout(work, branch);
    let path = work.join(file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(&path, content).expect("Failed to write file");
    git(work, &["add", file]);
    git_as(work, &["commit", "-q", "-m", message], name, email);
    git(work, &["push", "-q", "origin", branch]);
    git(work, &["rev-parse", "HEAD"])
}

pub fn checkout(work: &Path, branch: &str) {
    let exists = Command::new("git")
        .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
        .current_dir(work)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if exists {
        git(work, &["checkout", "-q", branch]);
    } else {
        git(work, &["checkout", "-q", "-b", branch]);
    }
}

/// Branch `name` off `from` in the work clone.
pub fn branch_from(work: &Path, name: &str, from: &str) {
    git(work, &["checkout", "-q", "-B", name, from]);
}

pub fn rev(repo: &Path, rev: &str) -> String {
    git(repo, &["rev-parse", rev])
}

pub fn parents(repo: &Path, commit: &str) -> Vec<String> {
    git(repo, &["rev-list", "--parents", "-n", "1", commit])
        .split_whitespace()
        .skip(1)
        .map(str::to_string)
        .collect()
}

pub fn tree(repo: &Path, commit: &str) -> String {
    git(repo, &["rev-parse", &format!("{commit}^{{tree}}")])
}

pub fn show(repo: &Path, commit: &str, file: &str) -> String {
    git(repo, &["show", &format!("{commit}:{file}")])
}

fn user(id: i64, name: &str) -> User {
    User {
        id,
        name: name.to_string(),
        email: format!("{name}@example.com"),
        signing_key: None,
    }
}

/// Bare base repository with one commit on `main`, a work clone, and a
/// service wired to real git with a recording runner.
pub fn setup() -> Fixture {
    setup_with_git(|git, _| git)
}

/// Like [`setup`], with the service's runner wrapped by `wrap`, which also
/// receives the work clone path.
pub fn setup_with_git(
    wrap: impl FnOnce(Arc<dyn GitRunner>, &Path) -> Arc<dyn GitRunner>,
) -> Fixture {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let base = tmp.path().join("base.git");
    let work = tmp.path().join("work");

    git(tmp.path(), &["init", "-q", "--bare", "-b", "main", "base.git"]);
    git(tmp.path(), &["clone", "-q", "base.git", "work"]);
    git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    fs::write(work.join("README.md"), "# widgets\n").expect("Failed to write README.md");
    git(&work, &["add", "README.md"]);
    git(&work, &["commit", "-q", "-m", "Initial commit"]);
    git(&work, &["push", "-q", "origin", "main"]);

    let mut config = MergeConfig::default();
    config.workspace.temp_root = Some(tmp.path().join("workspaces"));

    let store = Store::memory();
    store
        .transaction(|data| {
            for u in [
                user(OWNER, "owner"),
                user(POSTER, "poster"),
                user(WRITER, "writer"),
            ] {
                data.insert_user(u);
            }
            data.insert_repository(Repository {
                id: REPO,
                owner_id: OWNER,
                owner_name: "acme".to_string(),
                name: "widgets".to_string(),
                path: base.clone(),
                default_branch: "main".to_string(),
                settings: RepoSettings::default(),
            });
            data.grant(REPO, WRITER, AccessMode::Write);
            Ok(())
        })
        .expect("Failed to seed store");

    let system: Arc<dyn GitRunner> = Arc::new(SystemGit::new(
        "git",
        ProcessRunner::new(Duration::from_secs(60)),
        CancelToken::new(),
    ));
    let recorder = Arc::new(RecordingGit::new(system));
    let runner = wrap(recorder.clone(), &work);
    let (tx, rx) = mpsc::channel();
    let service = Arc::new(MergeService::new(
        config,
        Arc::new(store),
        Arc::new(MemoryQueue::new(100)),
        runner,
        Arc::new(ChannelNotifier::new(tx)),
    ));

    Fixture {
        tmp,
        base,
        work,
        service,
        recorder,
        events: rx,
    }
}

impl Fixture {
    /// Open a same-repository pull request from `head` into `main`.
    pub fn open_pull_request(&self, pr_id: i64, head: &str) -> i64 {
        self.open_pull_request_into(pr_id, head, "main")
    }

    pub fn open_pull_request_into(&self, pr_id: i64, head: &str, base: &str) -> i64 {
        self.service
            .store()
            .transaction(|data| {
                let issue_id = pr_id + 1000;
                data.insert_issue(Issue {
                    id: issue_id,
                    repo_id: REPO,
                    index: pr_id,
                    title: format!("Change {head}"),
                    body: String::new(),
                    poster_id: POSTER,
                    is_closed: false,
                });
                data.insert_pull_request(PullRequest::new(
                    pr_id, issue_id, pr_id, REPO, base, REPO, head,
                ));
                Ok(())
            })
            .expect("Failed to open pull request");
        pr_id
    }

    /// Register a bare fork of the base repository as repository [`FORK`].
    pub fn add_fork(&self) -> PathBuf {
        let fork = self.tmp.path().join("fork.git");
        git(
            self.tmp.path(),
            &["clone", "-q", "--bare", "base.git", "fork.git"],
        );
        let path = fork.clone();
        self.service
            .store()
            .transaction(|data| {
                data.insert_repository(Repository {
                    id: FORK,
                    owner_id: POSTER,
                    owner_name: "poster".to_string(),
                    name: "widgets".to_string(),
                    path,
                    default_branch: "main".to_string(),
                    settings: RepoSettings::default(),
                });
                Ok(())
            })
            .expect("Failed to add fork");
        fork
    }

    pub fn update_settings(&self, update: impl FnOnce(&mut RepoSettings)) {
        self.service
            .store()
            .transaction(|data| {
                if let Some(repo) = data.repositories.get_mut(&REPO) {
                    update(&mut repo.settings);
                }
                Ok(())
            })
            .expect("Failed to update settings");
    }

    /// Enqueue and test one pull request, returning the stored row.
    pub fn check(&self, pr_id: i64) -> PullRequest {
        self.service.add_to_task_queue(pr_id).expect("enqueue");
        self.service.drain_queue().expect("drain");
        self.pull(pr_id)
    }

    pub fn pull(&self, pr_id: i64) -> PullRequest {
        self.service
            .store()
            .view(|data| Ok(data.pull_request(pr_id)?.clone()))
            .expect("pull request")
    }

    pub fn issue_closed(&self, pr_id: i64) -> bool {
        self.service
            .store()
            .view(|data| Ok(data.issue(data.pull_request(pr_id)?.issue_id)?.is_closed))
            .expect("issue")
    }

    pub fn base_tip(&self) -> String {
        rev(&self.base, "refs/heads/main")
    }

    pub fn assert_status(&self, pr_id: i64, status: PullRequestStatus) {
        assert_eq!(self.pull(pr_id).status, status, "status of #{pr_id}");
    }
}
