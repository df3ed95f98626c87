//! Mergeability checks

use serial_test::serial;

use mergeq::error::NotAllowedReason;
use mergeq::models::{ProtectedBranch, PullRequestStatus};
use mergeq::MergeError;

use super::helpers::*;

#[test]
#[serial]
fn test_clean_pull_request_is_mergeable() {
    let fx = setup();
    let initial = fx.base_tip();
    branch_from(&fx.work, "topic", "main");
    commit_file(&fx.work, "topic", "src/lib.rs", "pub fn widget() {}\n", "Add lib");
    commit_file(&fx.work, "main", "docs.md", "docs\n", "Add docs");

    let pr = fx.open_pull_request(30, "topic");
    let row = fx.check(pr);
    assert_eq!(row.status, PullRequestStatus::Mergeable);
    assert_eq!(row.merge_base, initial);
    assert_eq!(row.commits_ahead, 1);
    assert_eq!(row.commits_behind, 1);
    assert!(row.conflicted_files.is_empty());

    // Re-testing unchanged branches gives the same answer
    let again = fx.check(pr);
    assert_eq!(again.status, row.status);
    assert_eq!(again.merge_base, row.merge_base);
    assert_eq!(again.check_generation, row.check_generation + 1);
}

#[test]
#[serial]
fn test_conflicting_change_lists_files() {
    let fx = setup();
    branch_from(&fx.work, "topic", "main");
    commit_file(&fx.work, "topic", "README.md", "# gadgets\n", "Rename on topic");
    commit_file(&fx.work, "topic", "notes.txt", "topic only\n", "Add notes");
    commit_file(&fx.work, "main", "README.md", "# sprockets\n", "Rename on main");

    let pr = fx.open_pull_request(30, "topic");
    let row = fx.check(pr);
    assert_eq!(row.status, PullRequestStatus::Conflict);
    assert_eq!(row.conflicted_files, vec!["README.md".to_string()]);
}

#[test]
#[serial]
fn test_change_already_on_base_is_empty() {
    let fx = setup();
    branch_from(&fx.work, "topic", "main");
    commit_file(&fx.work, "topic", "same.txt", "identical\n", "Add on topic");
    commit_file(&fx.work, "main", "same.txt", "identical\n", "Add on main");

    let pr = fx.open_pull_request(30, "topic");
    fx.check(pr);
    fx.assert_status(pr, PullRequestStatus::Empty);
}

#[test]
#[serial]
fn test_head_contained_in_base_is_ancestor() {
    let fx = setup();
    branch_from(&fx.work, "topic", "main");
    git(&fx.work, &["push", "-q", "origin", "topic"]);
    let head = rev(&fx.base, "refs/heads/topic");
    commit_file(&fx.work, "main", "later.txt", "later\n", "Later work");

    let pr = fx.open_pull_request(30, "topic");
    let row = fx.check(pr);
    assert_eq!(row.status, PullRequestStatus::Ancestor);
    assert_eq!(row.merge_base, head);
    assert_eq!(row.commits_ahead, 0);
    assert_eq!(row.commits_behind, 1);
}

#[test]
#[serial]
fn test_unrelated_histories_conflict_without_files() {
    let fx = setup();
    git(&fx.work, &["checkout", "-q", "--orphan", "lonely"]);
    git(&fx.work, &["rm", "-rfq", "."]);
    std::fs::write(fx.work.join("other.txt"), "other\n").unwrap();
    git(&fx.work, &["add", "other.txt"]);
    git(&fx.work, &["commit", "-q", "-m", "Start over"]);
    git(&fx.work, &["push", "-q", "origin", "lonely"]);

    let pr = fx.open_pull_request(30, "lonely");
    let row = fx.check(pr);
    assert_eq!(row.status, PullRequestStatus::Conflict);
    assert!(row.conflicted_files.is_empty());
}

#[test]
#[serial]
fn test_missing_head_branch_is_error() {
    let fx = setup();
    let pr = fx.open_pull_request(30, "does-not-exist");
    fx.check(pr);
    fx.assert_status(pr, PullRequestStatus::Error);
}

#[test]
#[serial]
fn test_protected_files_recorded_and_enforced() {
    let fx = setup();
    fx.service
        .store()
        .transaction(|data| {
            let mut rule = ProtectedBranch::new(REPO, "main");
            rule.protected_file_patterns = vec!["*.lock".to_string()];
            data.insert_protected_branch(rule);
            Ok(())
        })
        .unwrap();

    branch_from(&fx.work, "topic", "main");
    commit_file(&fx.work, "topic", "Cargo.lock", "# lock\n", "Bump lock");
    commit_file(&fx.work, "topic", "src/lib.rs", "\n", "Touch lib");

    let pr = fx.open_pull_request(30, "topic");
    let row = fx.check(pr);
    assert_eq!(row.status, PullRequestStatus::Mergeable);
    assert_eq!(row.changed_protected_files, vec!["Cargo.lock".to_string()]);

    let err = fx.service.check_pr_ready_to_merge(pr, false).unwrap_err();
    assert!(matches!(
        err,
        MergeError::NotAllowedToMerge {
            reason: NotAllowedReason::ProtectedFiles { .. }
        }
    ));
    fx.service.check_pr_ready_to_merge(pr, true).unwrap();
}

#[test]
#[serial]
fn test_base_push_retests_open_pull_requests() {
    let fx = setup();
    branch_from(&fx.work, "topic", "main");
    commit_file(&fx.work, "topic", "README.md", "# topic\n", "Edit readme");
    let pr = fx.open_pull_request(30, "topic");
    assert_eq!(fx.check(pr).status, PullRequestStatus::Mergeable);

    let before = fx.base_tip();
    let after = commit_file(&fx.work, "main", "README.md", "# main\n", "Edit readme on main");
    let queued = fx
        .service
        .on_push(REPO, "main", &before, &after, WRITER)
        .unwrap();
    assert_eq!(queued, vec![pr]);
    fx.assert_status(pr, PullRequestStatus::Checking);

    fx.service.drain_queue().unwrap();
    fx.assert_status(pr, PullRequestStatus::Conflict);
}

#[test]
#[serial]
fn test_file_deleted_on_both_sides_merges_cleanly() {
    let fx = setup();
    commit_file(&fx.work, "main", "old.txt", "old\n", "Add old file");
    branch_from(&fx.work, "topic", "main");
    git(&fx.work, &["rm", "-q", "old.txt"]);
    git(&fx.work, &["commit", "-q", "-m", "Drop old file on topic"]);
    commit_file(&fx.work, "topic", "new.txt", "new\n", "Add new file");

    git(&fx.work, &["checkout", "-q", "main"]);
    git(&fx.work, &["rm", "-q", "old.txt"]);
    git(&fx.work, &["commit", "-q", "-m", "Drop old file on main"]);
    git(&fx.work, &["push", "-q", "origin", "main"]);

    let pr = fx.open_pull_request(30, "topic");
    let row = fx.check(pr);
    assert_eq!(row.status, PullRequestStatus::Mergeable);
    assert!(row.conflicted_files.is_empty());

    let commit = fx
        .service
        .merge(&mergeq::MergeRequest::new(pr, WRITER, mergeq::models::MergeStyle::Squash))
        .unwrap();
    let files = git(&fx.base, &["ls-tree", "--name-only", &commit]);
    assert!(files.contains("new.txt"));
    assert!(!files.contains("old.txt"));
}
