//! Serve command - runs check workers until interrupted

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{info, warn};

use super::Runtime;

/// Recover pull requests left in `Checking`, then drain the queue with the
/// configured worker pool.
///
/// The first Ctrl-C stops taking new work and waits for running checks; a
/// second one also kills their git subprocesses.
pub fn execute(config_path: Option<&Path>) -> Result<()> {
    let runtime = Runtime::build(config_path)?;
    let service = &runtime.service;

    let interrupts = Arc::new(AtomicUsize::new(0));
    {
        let interrupts = Arc::clone(&interrupts);
        let cancel = runtime.cancel.clone();
        ctrlc::set_handler(move || {
            if interrupts.fetch_add(1, Ordering::SeqCst) >= 1 {
                cancel.cancel();
            }
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let recovered = service.recover_checking()?;
    if recovered > 0 {
        println!(
            "{} Re-enqueued {} pull request(s) left in checking",
            "→".cyan().bold(),
            recovered
        );
    }

    let pool = service.start_workers()?;
    let queued = service.queue().len()?;
    println!(
        "{} Serving with {} worker(s), {} queued",
        "✓".green().bold(),
        service.config().queue.workers,
        queued
    );

    while interrupts.load(Ordering::SeqCst) == 0 {
        thread::sleep(Duration::from_millis(200));
    }

    println!("{} Shutting down, waiting for running checks...", "→".cyan().bold());
    info!("shutdown requested");
    pool.shutdown();
    if runtime.cancel.is_cancelled() {
        warn!("running checks were cancelled");
    }
    println!("{} Stopped", "✓".green().bold());
    Ok(())
}
