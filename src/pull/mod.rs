//! Pull request merge pipeline
//!
//! [`MergeService`] ties the pieces together: it enqueues pull requests for
//! mergeability checks, runs those checks in disposable workspaces, gates
//! and executes merges, and reacts to pushes. It owns no global state; every
//! collaborator is handed in at construction.

mod check;
mod events;
mod manual;
mod merge;
mod permission;
mod prepare;
mod status;
mod update;


pub use merge::MergeRequest;
pub use permission::{check_readiness, is_user_allowed_to_merge, ReadinessInput};
pub use status::{latest_per_context, merge_required_contexts};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::MergeConfig;
use crate::error::{MergeError, Result};
use crate::git::GitRunner;
use crate::models::{Issue, ProtectedBranch, PullRequest, Repository};
use crate::notify::Notifier;
use crate::queue::UniqueQueue;
use crate::store::Store;

/// Rows a pull request operation reads together, from one snapshot.
#[derive(Debug, Clone)]
pub struct PullContext {
    pub pr: PullRequest,
    pub issue: Issue,
    pub base_repo: Repository,
    pub head_repo: Repository,
    /// Protection rule of the base branch
    pub rule: Option<ProtectedBranch>,
}

/// The merge pipeline service.
pub struct MergeService {
    config: MergeConfig,
    store: Arc<Store>,
    queue: Arc<dyn UniqueQueue>,
    git: Arc<dyn GitRunner>,
    notifier: Arc<dyn Notifier>,
    /// Serialises merges of the same pull request within this process
    pr_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl MergeService {
    pub fn new(
        config: MergeConfig,
        store: Arc<Store>,
        queue: Arc<dyn UniqueQueue>,
        git: Arc<dyn GitRunner>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            git,
            notifier,
            pr_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn UniqueQueue> {
        &self.queue
    }

    pub fn git(&self) -> &dyn GitRunner {
        self.git.as_ref()
    }

    /// Load a pull request with its issue, repositories and branch rule.
    pub fn load_context(&self, pr_id: i64) -> Result<PullContext> {
        self.store.view(|data| {
            let pr = data.pull_request(pr_id)?.clone();
            Ok(PullContext {
                issue: data.issue(pr.issue_id)?.clone(),
                base_repo: data.repository(pr.base_repo_id)?.clone(),
                head_repo: data.repository(pr.head_repo_id)?.clone(),
                rule: data.protected_branch(pr.base_repo_id, &pr.base_branch).cloned(),
                pr,
            })
        })
    }

    /// Run `f` holding the per-pull-request lock used by merge and update.
    ///
    /// The table entry is dropped again once no other caller holds or waits
    /// on it.
    fn with_pr_lock<T>(&self, pr_id: i64, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = Arc::clone(self.lock_table()?.entry(pr_id).or_default());
        let result = match lock.lock() {
            Ok(_guard) => f(),
            Err(_) => Err(MergeError::Store("pull request lock poisoned".to_string())),
        };
        // Clones are only handed out under the table lock, so a count of two
        // (table and ours) means nobody else is waiting.
        let mut locks = self.lock_table()?;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&pr_id);
        }
        result
    }

    fn lock_table(&self) -> Result<MutexGuard<'_, HashMap<i64, Arc<Mutex<()>>>>> {
        self.pr_locks
            .lock()
            .map_err(|_| MergeError::Store("pull request lock table poisoned".to_string()))
    }

    #[cfg(test)]
    fn held_pr_locks(&self) -> usize {
        self.pr_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
