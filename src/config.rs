//! Service configuration
//!
//! Loaded from `mergeq.toml`. Every section has defaults, so an empty or
//! missing file yields a working single-node configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "mergeq.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub git: GitConfig,
    pub queue: QueueConfig,
    pub workspace: WorkspaceConfig,
    pub store: StoreConfig,
    pub signing: SigningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Path or name of the git binary
    pub binary: String,
    /// Default subprocess timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: "git".to_string(),
            timeout_secs: 360,
        }
    }
}

impl GitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve the configured binary against PATH.
    pub fn resolve_binary(&self) -> Result<PathBuf> {
        which::which(&self.binary)
            .with_context(|| format!("git binary '{}' not found in PATH", self.binary))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueKind {
    Memory,
    Persistent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub kind: QueueKind,
    /// Number of worker threads draining the queue
    pub workers: usize,
    /// Maximum outstanding entries; further pushes fail with `QueueFull`
    pub capacity: usize,
    /// Directory for the persistent queue file
    pub dir: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            kind: QueueKind::Persistent,
            workers: 4,
            capacity: 10_000,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Parent directory for temporary workspaces (system temp dir when unset)
    pub temp_root: Option<PathBuf>,
}

impl WorkspaceConfig {
    pub fn temp_root(&self) -> PathBuf {
        self.temp_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("mergeq"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON store file (in-memory store when unset)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Key used when the doer has none configured
    pub default_key: Option<String>,
}

impl MergeConfig {
    /// Default data directory (`~/.local/share/mergeq` on Linux).
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mergeq")
    }

    /// Load configuration from `path`, or from the data directory when `None`.
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::data_dir().join(CONFIG_FILE_NAME),
        };

        if !path.exists() {
            return Ok(Self::default().with_data_dir_defaults());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
            .map(Self::with_data_dir_defaults)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: MergeConfig = toml::from_str(content)?;
        if config.queue.workers == 0 {
            anyhow::bail!("queue.workers must be at least 1");
        }
        Ok(config)
    }

    /// Fill unset persistence paths with locations under the data directory.
    fn with_data_dir_defaults(mut self) -> Self {
        let data_dir = Self::data_dir();
        if self.store.path.is_none() {
            self.store.path = Some(data_dir.join("store.json"));
        }
        if self.queue.dir.is_none() {
            self.queue.dir = Some(data_dir.join("queue"));
        }
        self
    }
}
