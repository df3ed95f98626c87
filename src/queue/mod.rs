//! Deduplicating work queue of pull request ids
//!
//! At most one queued entry exists per id. An entry leaves the queue when a
//! worker pops it, so an enqueue that arrives while the id is being tested
//! is accepted and causes exactly one more test.

mod memory;
mod persistent;
mod pool;


pub use memory::MemoryQueue;
pub use persistent::PersistentQueue;
pub use pool::{TaskHandler, WorkerPool};

use std::sync::Arc;
use std::time::Duration;

use crate::config::{QueueConfig, QueueKind};
use crate::error::Result;

/// Result of a [`UniqueQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// An entry for the id was already waiting; nothing changed
    AlreadyQueued,
}

/// Queue keyed by pull request id with set semantics.
pub trait UniqueQueue: Send + Sync {
    fn push(&self, id: i64) -> Result<PushOutcome>;

    fn has(&self, id: i64) -> Result<bool>;

    /// Remove and return the oldest entry, waiting up to `wait` for one.
    ///
    /// Returns `Err(QueueClosed)` once the queue is closed, even if entries
    /// remain; those stay for the next process when the queue is durable.
    fn pop(&self, wait: Duration) -> Result<Option<i64>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Stop handing out entries and wake every waiting `pop`.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Build the queue selected by configuration.
pub fn from_config(config: &QueueConfig) -> Result<Arc<dyn UniqueQueue>> {
    match config.kind {
        QueueKind::Memory => Ok(Arc::new(MemoryQueue::new(config.capacity))),
        QueueKind::Persistent => {
            let dir = config
                .dir
                .clone()
                .unwrap_or_else(|| crate::config::MergeConfig::data_dir().join("queue"));
            Ok(Arc::new(PersistentQueue::open(&dir, config.capacity)?))
        }
    }
}
