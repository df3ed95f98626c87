//! Updating a head branch with its base branch

use serial_test::serial;

use mergeq::models::PullRequestStatus;
use mergeq::MergeError;

use super::helpers::*;

fn behind_main(fx: &Fixture) -> (String, String) {
    branch_from(&fx.work, "topic", "main");
    let head = commit_file(&fx.work, "topic", "src/lib.rs", "pub fn widget() {}\n", "Add lib");
    let main = commit_file(&fx.work, "main", "docs.md", "docs\n", "Add docs");
    (head, main)
}

#[test]
#[serial]
fn test_merge_update_brings_base_into_head() {
    let fx = setup();
    let (old_head, main) = behind_main(&fx);
    let pr = fx.open_pull_request(30, "topic");
    assert_eq!(fx.check(pr).commits_behind, 1);

    assert!(fx.service.update(pr, WRITER, None, false).unwrap());

    let tip = rev(&fx.base, "refs/heads/topic");
    assert_eq!(parents(&fx.base, &tip), vec![old_head.clone(), main.clone()]);
    assert_eq!(
        git(&fx.base, &["log", "-1", "--format=%s", &tip]),
        "Merge branch 'main' into topic"
    );
    assert_eq!(fx.base_tip(), main, "base branch must not move");

    fx.assert_status(pr, PullRequestStatus::Checking);
    assert!(fx.service.queue().has(pr).unwrap());
    fx.service.drain_queue().unwrap();
    let row = fx.pull(pr);
    assert_eq!(row.status, PullRequestStatus::Mergeable);
    assert_eq!(row.commits_behind, 0);

    let event = fx.events.try_recv().unwrap();
    assert_eq!(event.name(), "synchronized");
    assert_eq!(event.pr_id(), pr);
}

#[test]
#[serial]
fn test_rebase_update_replays_head_on_base() {
    let fx = setup();
    let (old_head, main) = behind_main(&fx);
    let pr = fx.open_pull_request(30, "topic");
    fx.check(pr);

    assert!(fx.service.update(pr, WRITER, None, true).unwrap());

    let tip = rev(&fx.base, "refs/heads/topic");
    assert_ne!(tip, old_head);
    assert_eq!(parents(&fx.base, &tip), vec![main.clone()]);
    assert_eq!(show(&fx.base, &tip, "src/lib.rs"), "pub fn widget() {}");
    assert_eq!(show(&fx.base, &tip, "docs.md"), "docs");
}

#[test]
#[serial]
fn test_update_of_current_head_is_a_no_op() {
    let fx = setup();
    branch_from(&fx.work, "topic", "main");
    let head = commit_file(&fx.work, "topic", "src/lib.rs", "\n", "Add lib");
    let pr = fx.open_pull_request(30, "topic");
    fx.check(pr);

    assert!(!fx.service.update(pr, WRITER, None, false).unwrap());
    assert_eq!(rev(&fx.base, "refs/heads/topic"), head);
    assert!(fx.events.try_recv().is_err());
}

#[test]
#[serial]
fn test_update_conflict_leaves_head_alone() {
    let fx = setup();
    branch_from(&fx.work, "topic", "main");
    let head = commit_file(&fx.work, "topic", "README.md", "# topic\n", "Edit readme");
    commit_file(&fx.work, "main", "README.md", "# main\n", "Edit readme on main");
    let pr = fx.open_pull_request(30, "topic");

    let err = fx.service.update(pr, WRITER, None, false).unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.conflicted_files(), ["README.md".to_string()]);
    assert_eq!(rev(&fx.base, "refs/heads/topic"), head);
}

#[test]
#[serial]
fn test_update_requires_write_on_head() {
    let fx = setup();
    behind_main(&fx);
    let pr = fx.open_pull_request(30, "topic");

    let err = fx.service.update(pr, POSTER, None, false).unwrap_err();
    assert!(matches!(err, MergeError::NotAllowedToMerge { .. }));
}
