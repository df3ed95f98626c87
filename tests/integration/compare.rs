//! Commit and file comparisons between base and head

use serial_test::serial;

use mergeq::git::{get_compare_info, get_merge_base};

use super::helpers::*;

#[test]
#[serial]
fn test_three_dot_and_direct_comparison() {
    let fx = setup();
    let initial = fx.base_tip();
    branch_from(&fx.work, "topic", "main");
    let first = commit_file(&fx.work, "topic", "a.txt", "a\n", "Add a");
    let second = commit_file(&fx.work, "topic", "b.txt", "b\n", "Add b");
    let main = commit_file(&fx.work, "main", "docs.md", "docs\n", "Add docs");
    let pr = fx.open_pull_request(30, "topic");

    let info = fx.service.compare(pr, false, false).unwrap();
    assert_eq!(info.merge_base, initial);
    assert_eq!(info.base_commit_id, main);
    assert_eq!(info.head_commit_id, second);
    let ids: Vec<&str> = info.commits.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![first.as_str(), second.as_str()]);
    assert_eq!(info.commits[0].subject, "Add a");
    assert_eq!(info.num_files, 2);

    // docs.md only differs when comparing the tips directly
    let direct = fx.service.compare(pr, true, false).unwrap();
    assert_eq!(direct.num_files, 3);
    assert_eq!(direct.commits.len(), 2);

    let files_only = fx.service.compare(pr, false, true).unwrap();
    assert!(files_only.commits.is_empty());
    assert_eq!(files_only.num_files, 2);
}

#[test]
#[serial]
fn test_unrelated_branches_compare_directly() {
    let fx = setup();
    let main = fx.base_tip();
    git(&fx.work, &["checkout", "-q", "--orphan", "lonely"]);
    git(&fx.work, &["rm", "-rfq", "."]);
    std::fs::write(fx.work.join("other.txt"), "other\n").unwrap();
    git(&fx.work, &["add", "other.txt"]);
    git(&fx.work, &["commit", "-q", "-m", "Start over"]);
    git(&fx.work, &["push", "-q", "origin", "lonely"]);

    let info = get_compare_info(
        fx.service.git(),
        &fx.base,
        &fx.base,
        "main",
        "lonely",
        false,
        false,
    )
    .unwrap();
    assert_eq!(info.merge_base, main);
    assert_eq!(info.commits.len(), 1);
    // README.md removed, other.txt added
    assert_eq!(info.num_files, 2);
}

#[test]
#[serial]
fn test_fork_comparison_cleans_up_remote() {
    let fx = setup();
    let fork = fx.add_fork();
    git(&fx.work, &["remote", "add", "fork", &fork.to_string_lossy()]);
    branch_from(&fx.work, "feature", "main");
    std::fs::write(fx.work.join("feature.txt"), "feature\n").unwrap();
    git(&fx.work, &["add", "feature.txt"]);
    git(&fx.work, &["commit", "-q", "-m", "Add feature"]);
    git(&fx.work, &["push", "-q", "fork", "feature"]);
    let main = commit_file(&fx.work, "main", "docs.md", "docs\n", "Add docs");

    let info = get_compare_info(
        fx.service.git(),
        &fork,
        &fx.base,
        "main",
        "feature",
        false,
        false,
    )
    .unwrap();
    assert_eq!(info.base_commit_id, main);
    assert_eq!(info.commits.len(), 1);
    assert_eq!(info.num_files, 1);

    let remotes = git(&fork, &["remote"]);
    assert!(!remotes.contains("tmp-"), "leftover remote: {remotes}");
    assert_eq!(git(&fork, &["for-each-ref", "refs/mergeq"]), "");
}

#[test]
#[serial]
fn test_merge_base_against_named_remote() {
    let fx = setup();
    let initial = fx.base_tip();
    let fork = fx.add_fork();
    git(&fork, &["remote", "add", "upstream", &fx.base.to_string_lossy()]);
    git(&fx.work, &["remote", "add", "fork", &fork.to_string_lossy()]);
    branch_from(&fx.work, "feature", "main");
    std::fs::write(fx.work.join("feature.txt"), "feature\n").unwrap();
    git(&fx.work, &["add", "feature.txt"]);
    git(&fx.work, &["commit", "-q", "-m", "Add feature"]);
    git(&fx.work, &["push", "-q", "fork", "feature"]);
    let main = commit_file(&fx.work, "main", "docs.md", "docs\n", "Add docs");

    let (merge_base, resolved) =
        get_merge_base(fx.service.git(), &fork, "upstream", "main", "feature").unwrap();
    assert_eq!(merge_base, initial);
    assert_eq!(resolved, main);
    assert_eq!(git(&fork, &["for-each-ref", "refs/mergeq"]), "");

    // Local lookup does not see the upstream commit
    let (_, local) = get_merge_base(fx.service.git(), &fork, "origin", "main", "feature").unwrap();
    assert_eq!(local, initial);
}
