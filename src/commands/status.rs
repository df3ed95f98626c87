//! Status and compare commands

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use super::check::colored_status;
use super::Runtime;

pub fn execute(config_path: Option<&Path>, pr_id: i64) -> Result<()> {
    let runtime = Runtime::build(config_path)?;
    let service = &runtime.service;
    let ctx = service.load_context(pr_id)?;
    let pr = &ctx.pr;

    println!(
        "{} #{} {}",
        "Pull request".bold(),
        ctx.issue.index,
        ctx.issue.title
    );
    println!(
        "  {} -> {}",
        format!("{}:{}", ctx.head_repo.full_name(), pr.head_branch).dimmed(),
        format!("{}:{}", ctx.base_repo.full_name(), pr.base_branch).dimmed()
    );
    println!("  status:   {}", colored_status(pr.status));
    println!(
        "  commits:  {} ahead, {} behind",
        pr.commits_ahead, pr.commits_behind
    );

    if pr.has_merged {
        println!(
            "  merged:   {} by user {}",
            pr.merged_commit_id.as_deref().unwrap_or_default(),
            pr.merger_id.unwrap_or_default()
        );
        return Ok(());
    }

    if !pr.conflicted_files.is_empty() {
        println!("  {}", "conflicts:".red());
        for file in &pr.conflicted_files {
            println!("    {file}");
        }
    }
    if !pr.changed_protected_files.is_empty() {
        println!("  {}", "protected files changed:".yellow());
        for file in &pr.changed_protected_files {
            println!("    {file}");
        }
    }

    match service.commit_status_state(pr_id) {
        Ok(state) => println!("  checks:   {state}"),
        Err(e) => println!("  checks:   {}", format!("unavailable ({e})").dimmed()),
    }
    Ok(())
}

pub fn compare(
    config_path: Option<&Path>,
    pr_id: i64,
    direct: bool,
    files_only: bool,
    json: bool,
) -> Result<()> {
    let runtime = Runtime::build(config_path)?;
    let info = runtime.service.compare(pr_id, direct, files_only)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    println!("merge base: {}", info.merge_base);
    println!("base:       {}", info.base_commit_id);
    println!("head:       {}", info.head_commit_id);
    println!("files:      {}", info.num_files);
    for commit in &info.commits {
        println!(
            "  {} {} {}",
            commit.id.get(..10).unwrap_or(&commit.id).yellow(),
            commit.subject,
            format!("<{}>", commit.author_name).dimmed()
        );
    }
    Ok(())
}
