//! Merge execution for every style, and the guards in front of it

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use serial_test::serial;

use mergeq::git::{is_read_only, GitCommand, GitOutput, GitRunner};
use mergeq::models::{MergeStyle, PullRequestStatus};
use mergeq::notify::PullRequestEvent;
use mergeq::{MergeError, MergeRequest};

use super::helpers::*;

/// `topic` with two commits (one by Ann) and one unrelated commit on `main`.
/// Returns the base tip before merging.
fn diverged(fx: &Fixture) -> String {
    branch_from(&fx.work, "topic", "main");
    commit_file(&fx.work, "topic", "src/lib.rs", "pub fn widget() {}\n", "Add lib");
    commit_file_as(
        &fx.work,
        "topic",
        "src/extra.rs",
        "pub fn extra() {}\n",
        "Add extra",
        "Ann",
        "ann@example.com",
    );
    commit_file(&fx.work, "main", "docs.md", "docs\n", "Add docs")
}

fn merge_as(fx: &Fixture, pr: i64, style: MergeStyle) -> Result<String, MergeError> {
    fx.service.merge(&MergeRequest::new(pr, WRITER, style))
}

#[test]
#[serial]
fn test_merge_commit_has_base_and_head_parents() {
    let fx = setup();
    let base_before = diverged(&fx);
    let head = rev(&fx.base, "refs/heads/topic");
    let pr = fx.open_pull_request(30, "topic");
    assert_eq!(fx.check(pr).status, PullRequestStatus::Mergeable);

    let commit = merge_as(&fx, pr, MergeStyle::Merge).unwrap();
    assert_eq!(fx.base_tip(), commit);
    assert_eq!(parents(&fx.base, &commit), vec![base_before, head]);
    assert_eq!(show(&fx.base, &commit, "src/extra.rs"), "pub fn extra() {}");
    assert_eq!(show(&fx.base, &commit, "docs.md"), "docs");
    assert!(git(&fx.base, &["log", "-1", "--format=%s", &commit])
        .starts_with("Merge pull request 'Change topic' (#30)"));

    let row = fx.pull(pr);
    assert!(row.has_merged);
    assert_eq!(row.status, PullRequestStatus::Merged);
    assert_eq!(row.merged_commit_id.as_deref(), Some(commit.as_str()));
    assert_eq!(row.merger_id, Some(WRITER));
    assert!(row.merged_unix.is_some());
    assert!(fx.issue_closed(pr));

    let event = fx.events.try_recv().unwrap();
    assert_eq!(
        event,
        PullRequestEvent::Merged {
            pr_id: pr,
            repo_id: REPO,
            base_branch: "main".to_string(),
            merged_commit_id: commit,
            style: MergeStyle::Merge,
            doer_id: WRITER,
        }
    );
}

#[test]
#[serial]
fn test_squash_is_one_commit_with_merged_tree() {
    let fx = setup();
    let base_before = diverged(&fx);
    let pr = fx.open_pull_request(30, "topic");
    fx.check(pr);

    // Reference result of a plain three-way merge
    branch_from(&fx.work, "expected", "main");
    git(&fx.work, &["merge", "-q", "--no-ff", "-m", "reference", "topic"]);
    let expected_tree = tree(&fx.work, "expected");

    let commit = merge_as(&fx, pr, MergeStyle::Squash).unwrap();
    assert_eq!(parents(&fx.base, &commit), vec![base_before]);
    assert_eq!(tree(&fx.base, &commit), expected_tree);

    let message = git(&fx.base, &["log", "-1", "--format=%B", &commit]);
    assert!(message.starts_with("Change topic (#30)"));
    assert!(message.contains("Co-authored-by: Ann <ann@example.com>"));
    assert!(!message.contains("Co-authored-by: poster"));
    assert_eq!(
        git(&fx.base, &["log", "-1", "--format=%ae %ce", &commit]),
        "poster@example.com writer@example.com"
    );
}

#[test]
#[serial]
fn test_rebase_lands_linear_history() {
    let fx = setup();
    let base_before = diverged(&fx);
    let pr = fx.open_pull_request(30, "topic");
    fx.check(pr);

    let tip = merge_as(&fx, pr, MergeStyle::Rebase).unwrap();
    assert_eq!(fx.base_tip(), tip);
    assert_eq!(parents(&fx.base, &tip).len(), 1);
    assert_eq!(
        git(&fx.base, &["rev-list", "--count", &format!("{base_before}..{tip}")]),
        "2"
    );
    assert_eq!(
        git(&fx.base, &["rev-list", "--merges", &format!("{base_before}..{tip}")]),
        ""
    );
}

#[test]
#[serial]
fn test_rebase_merge_adds_merge_commit_on_top() {
    let fx = setup();
    let base_before = diverged(&fx);
    let pr = fx.open_pull_request(30, "topic");
    fx.check(pr);

    let tip = merge_as(&fx, pr, MergeStyle::RebaseMerge).unwrap();
    let tip_parents = parents(&fx.base, &tip);
    assert_eq!(tip_parents.len(), 2);
    assert_eq!(tip_parents[0], base_before);
    assert_eq!(parents(&fx.base, &tip_parents[1]).len(), 1);
    assert_eq!(
        git(&fx.base, &["merge-base", &base_before, &tip_parents[1]]),
        base_before
    );
}

#[test]
#[serial]
fn test_conflict_at_merge_time_is_typed() {
    let fx = setup();
    branch_from(&fx.work, "topic", "main");
    commit_file(&fx.work, "topic", "README.md", "# topic\n", "Edit readme");
    let pr = fx.open_pull_request(30, "topic");
    assert_eq!(fx.check(pr).status, PullRequestStatus::Mergeable);

    // Base moves without a re-check
    let tip = commit_file(&fx.work, "main", "README.md", "# main\n", "Edit readme on main");

    let err = merge_as(&fx, pr, MergeStyle::Merge).unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.conflicted_files(), ["README.md".to_string()]);
    assert_eq!(fx.base_tip(), tip);
    assert!(!fx.pull(pr).has_merged);

    let err = merge_as(&fx, pr, MergeStyle::Rebase).unwrap_err();
    assert!(matches!(err.root(), MergeError::RebaseConflict { files, .. } if files == &["README.md".to_string()]));
    assert_eq!(fx.base_tip(), tip);
}

#[test]
#[serial]
fn test_stale_head_is_refused_before_any_write() {
    let fx = setup();
    diverged(&fx);
    let pr = fx.open_pull_request(30, "topic");
    fx.check(pr);
    let base_before = fx.base_tip();
    let seen = rev(&fx.base, "refs/heads/topic");
    let moved = commit_file(&fx.work, "topic", "late.txt", "late\n", "Late push");

    fx.recorder.clear();
    let mut req = MergeRequest::new(pr, WRITER, MergeStyle::Merge);
    req.expected_head = Some(seen.clone());
    let err = fx.service.merge(&req).unwrap_err();
    assert!(matches!(
        err.root(),
        MergeError::HeadOutOfDate { expected, actual } if *expected == seen && *actual == moved
    ));

    let names = fx.recorder.names();
    assert!(!names.is_empty());
    assert!(names.iter().all(|n| is_read_only(n)), "unexpected writes: {names:?}");
    assert_eq!(fx.base_tip(), base_before);
    assert!(!fx.pull(pr).has_merged);
}

#[test]
#[serial]
fn test_second_merge_is_already_merged() {
    let fx = setup();
    diverged(&fx);
    let pr = fx.open_pull_request(30, "topic");
    fx.check(pr);

    let commit = merge_as(&fx, pr, MergeStyle::Merge).unwrap();
    let err = merge_as(&fx, pr, MergeStyle::Squash).unwrap_err();
    assert!(matches!(err, MergeError::AlreadyMerged { pr_id: 30 }));
    assert_eq!(fx.base_tip(), commit);
    assert_eq!(fx.pull(pr).merged_commit_id.as_deref(), Some(commit.as_str()));
}

#[test]
#[serial]
fn test_concurrent_merges_land_once() {
    let fx = setup();
    diverged(&fx);
    let pr = fx.open_pull_request(30, "topic");
    fx.check(pr);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = Arc::clone(&fx.service);
            thread::spawn(move || service.merge(&MergeRequest::new(pr, WRITER, MergeStyle::Merge)))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let landed: Vec<&String> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(landed.len(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(MergeError::AlreadyMerged { .. }))));
    assert_eq!(fx.base_tip(), *landed[0]);
}

#[test]
#[serial]
fn test_merge_requeues_other_pull_requests() {
    let fx = setup();
    diverged(&fx);
    branch_from(&fx.work, "other", "main");
    commit_file(&fx.work, "other", "other.txt", "other\n", "Other change");

    let pr = fx.open_pull_request(30, "topic");
    let other = fx.open_pull_request(31, "other");
    fx.check(pr);
    assert_eq!(fx.check(other).status, PullRequestStatus::Mergeable);

    merge_as(&fx, pr, MergeStyle::Merge).unwrap();
    fx.assert_status(other, PullRequestStatus::Checking);
    assert!(fx.service.queue().has(other).unwrap());
    assert!(!fx.service.queue().has(pr).unwrap());

    fx.service.drain_queue().unwrap();
    let row = fx.pull(other);
    assert_eq!(row.status, PullRequestStatus::Mergeable);
    // merge commit plus the two topic commits
    assert_eq!(row.commits_behind, 3);
}

#[test]
#[serial]
fn test_merge_needs_write_access_and_a_verdict() {
    let fx = setup();
    diverged(&fx);
    let pr = fx.open_pull_request(30, "topic");

    let err = merge_as(&fx, pr, MergeStyle::Merge).unwrap_err();
    assert!(matches!(err, MergeError::NotAllowedToMerge { .. }));

    fx.check(pr);
    let err = fx
        .service
        .merge(&MergeRequest::new(pr, POSTER, MergeStyle::Merge))
        .unwrap_err();
    assert!(matches!(err, MergeError::NotAllowedToMerge { .. }));
    assert!(!fx.pull(pr).has_merged);
}

#[test]
#[serial]
fn test_fork_pull_request_merges_and_syncs_head_ref() {
    let fx = setup();
    let fork = fx.add_fork();
    git(&fx.work, &["remote", "add", "fork", &fork.to_string_lossy()]);
    branch_from(&fx.work, "feature", "main");
    std::fs::write(fx.work.join("feature.txt"), "feature\n").unwrap();
    git(&fx.work, &["add", "feature.txt"]);
    git(&fx.work, &["commit", "-q", "-m", "Add feature"]);
    git(&fx.work, &["push", "-q", "fork", "feature"]);
    let head = rev(&fork, "refs/heads/feature");

    fx.service
        .store()
        .transaction(|data| {
            data.insert_issue(mergeq::models::Issue {
                id: 1040,
                repo_id: REPO,
                index: 40,
                title: "Feature".to_string(),
                body: String::new(),
                poster_id: POSTER,
                is_closed: false,
            });
            data.insert_pull_request(mergeq::models::PullRequest::new(
                40, 1040, 40, REPO, "main", FORK, "feature",
            ));
            Ok(())
        })
        .unwrap();

    fx.service
        .on_head_pushed(FORK, "feature", "0".repeat(40).as_str(), &head, POSTER)
        .unwrap();
    assert_eq!(rev(&fx.base, "refs/pull/40/head"), head);

    fx.service.drain_queue().unwrap();
    fx.assert_status(40, PullRequestStatus::Mergeable);
    let commit = merge_as(&fx, 40, MergeStyle::Merge).unwrap();
    assert!(git(&fx.base, &["log", "-1", "--format=%s", &commit])
        .ends_with("from poster/widgets:feature into main"));
    assert_eq!(parents(&fx.base, &commit)[1], head);
}

/// Lands an unrelated commit on `main` just before the first push goes out.
struct AdvanceBaseOnPush {
    inner: Arc<dyn GitRunner>,
    work: PathBuf,
    fired: AtomicBool,
}

impl GitRunner for AdvanceBaseOnPush {
    fn output(&self, cmd: &GitCommand) -> mergeq::Result<GitOutput> {
        if cmd.name() == "push" && !self.fired.swap(true, Ordering::SeqCst) {
            commit_file(&self.work, "main", "race.txt", "race\n", "Concurrent push");
        }
        self.inner.output(cmd)
    }
}

#[test]
#[serial]
fn test_base_moved_before_push_is_out_of_date() {
    let fx = setup_with_git(|inner, work: &Path| {
        Arc::new(AdvanceBaseOnPush {
            inner,
            work: work.to_path_buf(),
            fired: AtomicBool::new(false),
        })
    });
    diverged(&fx);
    let pr = fx.open_pull_request(30, "topic");
    assert_eq!(fx.check(pr).status, PullRequestStatus::Mergeable);

    let err = merge_as(&fx, pr, MergeStyle::Merge).unwrap_err();
    assert!(matches!(err, MergeError::PushOutOfDate { .. }), "got {err:?}");

    assert_eq!(show(&fx.base, "refs/heads/main", "race.txt"), "race");
    let row = fx.pull(pr);
    assert!(!row.has_merged);
    assert_eq!(row.status, PullRequestStatus::Mergeable);
    assert!(row.merged_commit_id.is_none());
    assert!(!fx.issue_closed(pr));
    assert!(fx.events.try_recv().is_err());
}

#[test]
#[serial]
fn test_push_declined_by_hook_leaves_pull_request_open() {
    let fx = setup();
    diverged(&fx);
    let pr = fx.open_pull_request(30, "topic");
    fx.check(pr);
    let base_before = fx.base_tip();

    let hook = fx.base.join("hooks").join("pre-receive");
    fs::create_dir_all(hook.parent().unwrap()).unwrap();
    fs::write(&hook, "#!/bin/sh\necho denied >&2\nexit 1\n").unwrap();
    fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)).unwrap();

    let err = merge_as(&fx, pr, MergeStyle::Merge).unwrap_err();
    match &err {
        MergeError::PushRejected { message } => {
            assert!(message.contains("pre-receive hook declined"), "{message}")
        }
        other => panic!("expected a declined push, got {other:?}"),
    }
    assert_eq!(fx.base_tip(), base_before);
    let row = fx.pull(pr);
    assert!(!row.has_merged);
    assert!(!fx.issue_closed(pr));
    assert!(fx.events.try_recv().is_err());
}
