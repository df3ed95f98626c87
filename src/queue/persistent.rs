use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use super::{PushOutcome, UniqueQueue};
use crate::error::{MergeError, Result};
use crate::fs::{locked_read, locked_update};

/// File name of the queue inside its directory.
const QUEUE_FILE: &str = "pull-checks.json";

/// Re-read interval while waiting, to pick up pushes from other processes.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Queue stored as a JSON id list under an advisory lock.
///
/// Entries survive restarts and are redelivered to the next process that
/// opens the same directory. Pushes from this process wake local waiters
/// immediately; pushes from other processes are seen within one poll.
pub struct PersistentQueue {
    path: PathBuf,
    capacity: usize,
    closed: Mutex<bool>,
    ready: Condvar,
}

fn decode(content: &str) -> Result<Vec<i64>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(content)?)
}

fn encode(ids: &[i64]) -> Result<Option<String>> {
    Ok(Some(serde_json::to_string(ids)?))
}

impl PersistentQueue {
    pub fn open(dir: &Path, capacity: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let queue = Self {
            path: dir.join(QUEUE_FILE),
            capacity,
            closed: Mutex::new(false),
            ready: Condvar::new(),
        };
        debug!(path = %queue.path.display(), pending = queue.len()?, "opened persistent queue");
        Ok(queue)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_pop(&self) -> Result<Option<i64>> {
        locked_update(&self.path, |content| {
            let mut ids = decode(content)?;
            if ids.is_empty() {
                return Ok((None, None));
            }
            let id = ids.remove(0);
            Ok((encode(&ids)?, Some(id)))
        })
    }
}

impl UniqueQueue for PersistentQueue {
    fn push(&self, id: i64) -> Result<PushOutcome> {
        if self.is_closed() {
            return Err(MergeError::QueueClosed);
        }
        let capacity = self.capacity;
        let outcome = locked_update(&self.path, |content| {
            let mut ids = decode(content)?;
            if ids.contains(&id) {
                return Ok((None, PushOutcome::AlreadyQueued));
            }
            if ids.len() >= capacity {
                return Err(MergeError::QueueFull { capacity });
            }
            ids.push(id);
            Ok((encode(&ids)?, PushOutcome::Queued))
        })?;
        if outcome == PushOutcome::Queued {
            self.ready.notify_one();
        }
        Ok(outcome)
    }

    fn has(&self, id: i64) -> Result<bool> {
        Ok(decode(&locked_read(&self.path)?)?.contains(&id))
    }

    fn pop(&self, wait: Duration) -> Result<Option<i64>> {
        let deadline = Instant::now() + wait;
        loop {
            if self.is_closed() {
                return Err(MergeError::QueueClosed);
            }
            if let Some(id) = self.try_pop()? {
                return Ok(Some(id));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let closed = self
                .closed
                .lock()
                .map_err(|_| MergeError::Store("queue lock poisoned".to_string()))?;
            if *closed {
                return Err(MergeError::QueueClosed);
            }
            let _ = self
                .ready
                .wait_timeout(closed, (deadline - now).min(POLL_INTERVAL))
                .map_err(|_| MergeError::Store("queue lock poisoned".to_string()))?;
        }
    }

    fn len(&self) -> Result<usize> {
        Ok(decode(&locked_read(&self.path)?)?.len())
    }

    fn close(&self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
        self.ready.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.closed.lock().map(|c| *c).unwrap_or(true)
    }
}
