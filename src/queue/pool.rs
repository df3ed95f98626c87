use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::UniqueQueue;
use crate::error::{MergeError, Result};

/// How long an idle worker blocks in `pop` before re-checking shutdown.
const POP_WAIT: Duration = Duration::from_millis(500);

/// Backoff after a queue read error.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Callback run for every popped id.
pub type TaskHandler = Arc<dyn Fn(i64) -> Result<()> + Send + Sync>;

/// Fixed set of threads draining a [`UniqueQueue`].
///
/// Handler errors and panics are logged; the id is not retried until
/// something enqueues it again.
pub struct WorkerPool {
    name: String,
    queue: Arc<dyn UniqueQueue>,
    shutdown_flag: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` threads.
    ///
    /// # Arguments
    /// * `name` - Thread name prefix, also used in log fields
    /// * `queue` - Queue to drain
    /// * `workers` - Number of threads (at least one is started)
    /// * `handler` - Invoked once per popped id
    pub fn start(
        name: &str,
        queue: Arc<dyn UniqueQueue>,
        workers: usize,
        handler: TaskHandler,
    ) -> Result<Self> {
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(workers.max(1));

        for n in 0..workers.max(1) {
            let queue = Arc::clone(&queue);
            let flag = Arc::clone(&shutdown_flag);
            let handler = Arc::clone(&handler);
            let pool = name.to_string();
            let handle = thread::Builder::new()
                .name(format!("{name}-{n}"))
                .spawn(move || worker_loop(&pool, n, queue.as_ref(), &flag, &handler))?;
            handles.push(handle);
        }

        info!(pool = name, workers = handles.len(), "worker pool started");
        Ok(Self {
            name: name.to_string(),
            queue,
            shutdown_flag,
            handles,
        })
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    /// Stop taking new work and wait for in-flight tasks to finish.
    pub fn shutdown(self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        self.queue.close();
        for handle in self.handles {
            if handle.join().is_err() {
                warn!(pool = %self.name, "worker thread panicked outside a task");
            }
        }
        info!(pool = %self.name, "worker pool stopped");
    }
}

fn worker_loop(
    pool: &str,
    worker: usize,
    queue: &dyn UniqueQueue,
    shutdown_flag: &AtomicBool,
    handler: &TaskHandler,
) {
    while !shutdown_flag.load(Ordering::SeqCst) {
        let id = match queue.pop(POP_WAIT) {
            Ok(Some(id)) => id,
            Ok(None) => continue,
            Err(MergeError::QueueClosed) => break,
            Err(e) => {
                warn!(pool, worker, "queue read failed: {e}");
                thread::sleep(ERROR_BACKOFF);
                continue;
            }
        };

        debug!(pool, worker, pr_id = id, "task started");
        match panic::catch_unwind(AssertUnwindSafe(|| handler(id))) {
            Ok(Ok(())) => debug!(pool, worker, pr_id = id, "task finished"),
            Ok(Err(e)) => error!(pool, worker, pr_id = id, "task failed: {e}"),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(pool, worker, pr_id = id, "task panicked: {message}");
            }
        }
    }
    debug!(pool, worker, "worker exiting");
}
