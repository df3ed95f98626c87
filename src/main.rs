use anyhow::Result;
use clap::{Parser, Subcommand};
use mergeq::commands::{check, merge, serve, status};
use mergeq::models::MergeStyle;
use mergeq::MergeRequest;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "mergeq")]
#[command(about = "Pull request mergeability checks and merges", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to mergeq.toml in the data directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run check workers until interrupted
    Serve,

    /// Test one pull request now
    Check {
        pr_id: i64,
    },

    /// Merge a pull request
    Merge {
        pr_id: i64,

        /// User performing the merge
        #[arg(long)]
        doer: i64,

        /// merge, rebase, rebase-merge, squash or manually-merged
        #[arg(long, default_value = "merge")]
        style: MergeStyle,

        /// Refuse unless the head is still at this commit
        #[arg(long, value_name = "SHA")]
        head: Option<String>,

        /// Commit message (style default when omitted)
        #[arg(short, long)]
        message: Option<String>,

        /// Merge even if protected files changed (admins)
        #[arg(long)]
        skip_protected_files: bool,

        /// Commit that merged the pull request (manually-merged only)
        #[arg(long, value_name = "SHA")]
        commit: Option<String>,
    },

    /// Bring the base branch into the head branch
    Update {
        pr_id: i64,

        #[arg(long)]
        doer: i64,

        /// Rebase the head onto the base instead of merging
        #[arg(long)]
        rebase: bool,

        #[arg(short, long)]
        message: Option<String>,
    },

    /// Point a pull request at another base branch
    Retarget {
        pr_id: i64,

        #[arg(long)]
        doer: i64,

        /// New base branch
        branch: String,
    },

    /// Report a branch push and re-test affected pull requests
    Push {
        repo_id: i64,
        branch: String,

        #[arg(long)]
        before: String,

        #[arg(long)]
        after: String,

        #[arg(long)]
        doer: i64,
    },

    /// Show the stored state of a pull request
    Status {
        pr_id: i64,
    },

    /// List commits and changed files between base and head
    Compare {
        pr_id: i64,

        /// Use base..head instead of base...head
        #[arg(long)]
        direct: bool,

        /// Skip the commit list
        #[arg(long)]
        files_only: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-enqueue pull requests left in checking and test them
    Recover,
}

/// Log to stderr; `MERGEQ_LOG` takes precedence over `RUST_LOG`.
fn init_logging() {
    let filter = EnvFilter::try_from_env("MERGEQ_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Serve => serve::execute(config),
        Commands::Check { pr_id } => check::execute(config, pr_id),
        Commands::Merge {
            pr_id,
            doer,
            style,
            head,
            message,
            skip_protected_files,
            commit,
        } => {
            let req = MergeRequest {
                expected_head: head,
                message,
                skip_protected_files_check: skip_protected_files,
                merged_commit: commit,
                ..MergeRequest::new(pr_id, doer, style)
            };
            merge::execute(config, &req)
        }
        Commands::Update {
            pr_id,
            doer,
            rebase,
            message,
        } => merge::update(config, pr_id, doer, message, rebase),
        Commands::Retarget {
            pr_id,
            doer,
            branch,
        } => merge::retarget(config, pr_id, doer, &branch),
        Commands::Push {
            repo_id,
            branch,
            before,
            after,
            doer,
        } => check::push(config, repo_id, &branch, &before, &after, doer),
        Commands::Status { pr_id } => status::execute(config, pr_id),
        Commands::Compare {
            pr_id,
            direct,
            files_only,
            json,
        } => status::compare(config, pr_id, direct, files_only, json),
        Commands::Recover => check::recover(config),
    }
}
