//! Check, recover and push commands

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use super::Runtime;
use crate::models::PullRequestStatus;

pub(crate) fn colored_status(status: PullRequestStatus) -> String {
    let text = status.to_string();
    match status {
        PullRequestStatus::Mergeable | PullRequestStatus::Empty => text.green().to_string(),
        PullRequestStatus::Conflict | PullRequestStatus::Error => text.red().to_string(),
        PullRequestStatus::Checking => text.yellow().to_string(),
        PullRequestStatus::Ancestor
        | PullRequestStatus::Merged
        | PullRequestStatus::ManuallyMerged => text.cyan().to_string(),
    }
}

/// Test one pull request on this thread.
pub fn execute(config_path: Option<&Path>, pr_id: i64) -> Result<()> {
    let runtime = Runtime::build(config_path)?;
    let service = &runtime.service;

    if service.begin_check(pr_id)?.is_none() {
        println!("{} Pull request {} is already merged", "─".dimmed(), pr_id);
        return Ok(());
    }
    match service.test_pull_request(pr_id)? {
        Some(status) => println!("{} #{}: {}", "✓".green().bold(), pr_id, colored_status(status)),
        None => println!("{} #{}: result superseded", "─".dimmed(), pr_id),
    }
    Ok(())
}

/// Re-enqueue pull requests left in `Checking` and test everything queued.
pub fn recover(config_path: Option<&Path>) -> Result<()> {
    let runtime = Runtime::build(config_path)?;
    let queued = runtime.service.recover_checking()?;
    println!("{} Re-enqueued {} pull request(s)", "→".cyan().bold(), queued);
    let tested = runtime.service.drain_queue()?;
    println!("{} Tested {} pull request(s)", "✓".green().bold(), tested);
    Ok(())
}

/// Report a push to `branch` of `repo_id` and test the affected pull requests.
pub fn push(
    config_path: Option<&Path>,
    repo_id: i64,
    branch: &str,
    before: &str,
    after: &str,
    doer_id: i64,
) -> Result<()> {
    let runtime = Runtime::build(config_path)?;
    let ids = runtime
        .service
        .on_push(repo_id, branch, before, after, doer_id)?;
    if ids.is_empty() {
        println!("{} No open pull requests affected", "─".dimmed());
        return Ok(());
    }
    println!(
        "{} Re-enqueued {}",
        "→".cyan().bold(),
        ids.iter().map(|id| format!("#{id}")).collect::<Vec<_>>().join(", ")
    );
    runtime.service.drain_queue()?;
    Ok(())
}
