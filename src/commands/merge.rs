//! Merge, update and retarget commands

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use super::Runtime;
use crate::error::MergeError;
use crate::pull::MergeRequest;

/// Print the conflict hint for errors that carry a file list.
fn explain(err: &MergeError) {
    let files = err.conflicted_files();
    if files.is_empty() {
        return;
    }
    eprintln!("{} Conflicting files:", "✗".red().bold());
    for file in files {
        eprintln!("    {file}");
    }
}

pub fn execute(config_path: Option<&Path>, req: &MergeRequest) -> Result<()> {
    let runtime = Runtime::build(config_path)?;
    println!(
        "{} Merging #{} ({})...",
        "→".cyan().bold(),
        req.pr_id,
        req.style
    );
    match runtime.service.merge(req) {
        Ok(commit) => {
            println!("{} Merged as {}", "✓".green().bold(), commit.dimmed());
            Ok(())
        }
        Err(e) => {
            explain(&e);
            Err(e).with_context(|| format!("Failed to merge pull request {}", req.pr_id))
        }
    }
}

pub fn update(
    config_path: Option<&Path>,
    pr_id: i64,
    doer_id: i64,
    message: Option<String>,
    rebase: bool,
) -> Result<()> {
    let runtime = Runtime::build(config_path)?;
    match runtime.service.update(pr_id, doer_id, message, rebase) {
        Ok(true) => {
            println!("{} Head branch of #{} updated", "✓".green().bold(), pr_id);
            runtime.service.drain_queue()?;
            Ok(())
        }
        Ok(false) => {
            println!("{} #{} is already up to date", "─".dimmed(), pr_id);
            Ok(())
        }
        Err(e) => {
            explain(&e);
            Err(e).with_context(|| format!("Failed to update pull request {pr_id}"))
        }
    }
}

pub fn retarget(config_path: Option<&Path>, pr_id: i64, doer_id: i64, branch: &str) -> Result<()> {
    let runtime = Runtime::build(config_path)?;
    runtime
        .service
        .change_target_branch(pr_id, doer_id, branch)
        .with_context(|| format!("Failed to retarget pull request {pr_id}"))?;
    println!("{} #{} now targets {}", "✓".green().bold(), pr_id, branch.bold());
    Ok(())
}
