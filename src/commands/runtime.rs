use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::MergeConfig;
use crate::git::SystemGit;
use crate::notify::LogNotifier;
use crate::process::{CancelToken, ProcessRunner};
use crate::pull::MergeService;
use crate::queue;
use crate::store::Store;

/// A configured service plus the token that cancels its subprocesses.
pub struct Runtime {
    pub service: Arc<MergeService>,
    pub cancel: CancelToken,
}

impl Runtime {
    /// Load configuration and wire up git, store, queue and notifier.
    pub fn build(config_path: Option<&Path>) -> Result<Self> {
        let config = MergeConfig::load(config_path)?;
        let binary = config.git.resolve_binary()?;
        debug!(git = %binary.display(), "resolved git binary");

        let cancel = CancelToken::new();
        let git = SystemGit::new(
            binary.to_string_lossy().into_owned(),
            ProcessRunner::new(config.git.timeout()),
            cancel.clone(),
        );
        let store = match &config.store.path {
            Some(path) => Store::open(path.clone()),
            None => Store::memory(),
        };
        let queue = queue::from_config(&config.queue).context("Failed to open task queue")?;

        let service = MergeService::new(
            config,
            Arc::new(store),
            queue,
            Arc::new(git),
            Arc::new(LogNotifier),
        );
        Ok(Self {
            service: Arc::new(service),
            cancel,
        })
    }
}
