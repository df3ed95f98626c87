//! Pull requests merged outside the service

use serial_test::serial;

use mergeq::models::{MergeStyle, PullRequestStatus};
use mergeq::{MergeError, MergeRequest};

use super::helpers::*;

fn topic(fx: &Fixture) -> String {
    branch_from(&fx.work, "topic", "main");
    commit_file(&fx.work, "topic", "src/lib.rs", "pub fn widget() {}\n", "Add lib")
}

#[test]
#[serial]
fn test_no_ff_merge_is_detected_and_attributed() {
    let fx = setup();
    fx.update_settings(|s| s.autodetect_manual_merge = true);
    topic(&fx);
    let pr = fx.open_pull_request(30, "topic");

    git(&fx.work, &["checkout", "-q", "main"]);
    git_as(
        &fx.work,
        &["merge", "-q", "--no-ff", "-m", "Merge topic by hand", "topic"],
        "writer",
        "writer@example.com",
    );
    git(&fx.work, &["push", "-q", "origin", "main"]);
    let merge = fx.base_tip();

    let row = fx.check(pr);
    assert_eq!(row.status, PullRequestStatus::ManuallyMerged);
    assert!(row.has_merged);
    assert_eq!(row.merged_commit_id.as_deref(), Some(merge.as_str()));
    assert_eq!(row.merger_id, Some(WRITER));
    assert!(fx.issue_closed(pr));
}

#[test]
#[serial]
fn test_fast_forward_records_head_and_owner() {
    let fx = setup();
    fx.update_settings(|s| s.autodetect_manual_merge = true);
    let head = topic(&fx);
    let pr = fx.open_pull_request(30, "topic");

    // Pushed by an unknown author: falls back to the repository owner
    git(&fx.work, &["push", "-q", "origin", "topic:main"]);

    let row = fx.check(pr);
    assert_eq!(row.status, PullRequestStatus::ManuallyMerged);
    assert_eq!(row.merged_commit_id.as_deref(), Some(head.as_str()));
    assert_eq!(row.merger_id, Some(OWNER));
}

#[test]
#[serial]
fn test_without_autodetect_merged_head_is_ancestor() {
    let fx = setup();
    topic(&fx);
    let pr = fx.open_pull_request(30, "topic");
    git(&fx.work, &["push", "-q", "origin", "topic:main"]);

    let row = fx.check(pr);
    assert_eq!(row.status, PullRequestStatus::Ancestor);
    assert!(!row.has_merged);
}

#[test]
#[serial]
fn test_manually_merged_request_validates_commit() {
    let fx = setup();
    let head = topic(&fx);
    let pr = fx.open_pull_request(30, "topic");
    let elsewhere = commit_file(&fx.work, "scratch", "scratch.txt", "x\n", "Not on main");

    let mut req = MergeRequest::new(pr, WRITER, MergeStyle::ManuallyMerged);
    req.merged_commit = Some(elsewhere.clone());
    let err = fx.service.merge(&req).unwrap_err();
    assert!(matches!(err, MergeError::InvalidMergedCommit { commit } if commit == elsewhere));

    req.merged_commit = Some("1234".to_string());
    assert!(matches!(
        fx.service.merge(&req).unwrap_err(),
        MergeError::InvalidMergedCommit { .. }
    ));
    assert!(!fx.pull(pr).has_merged);

    git(&fx.work, &["push", "-q", "origin", "topic:main"]);
    req.merged_commit = Some(head.clone());
    assert_eq!(fx.service.merge(&req).unwrap(), head);

    let row = fx.pull(pr);
    assert_eq!(row.status, PullRequestStatus::ManuallyMerged);
    assert_eq!(row.merger_id, Some(WRITER));
}
