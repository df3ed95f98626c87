use std::collections::{HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{PushOutcome, UniqueQueue};
use crate::error::{MergeError, Result};

#[derive(Default)]
struct State {
    order: VecDeque<i64>,
    members: HashSet<i64>,
    closed: bool,
}

/// Bounded in-process queue. Entries are lost when the process exits.
pub struct MemoryQueue {
    state: Mutex<State>,
    ready: Condvar,
    capacity: usize,
}

impl MemoryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            ready: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| MergeError::Store("queue lock poisoned".to_string()))
    }
}

impl UniqueQueue for MemoryQueue {
    fn push(&self, id: i64) -> Result<PushOutcome> {
        let mut state = self.lock()?;
        if state.closed {
            return Err(MergeError::QueueClosed);
        }
        if state.members.contains(&id) {
            return Ok(PushOutcome::AlreadyQueued);
        }
        if state.order.len() >= self.capacity {
            return Err(MergeError::QueueFull {
                capacity: self.capacity,
            });
        }
        state.members.insert(id);
        state.order.push_back(id);
        self.ready.notify_one();
        Ok(PushOutcome::Queued)
    }

    fn has(&self, id: i64) -> Result<bool> {
        Ok(self.lock()?.members.contains(&id))
    }

    fn pop(&self, wait: Duration) -> Result<Option<i64>> {
        let deadline = Instant::now() + wait;
        let mut state = self.lock()?;
        loop {
            if state.closed {
                return Err(MergeError::QueueClosed);
            }
            if let Some(id) = state.order.pop_front() {
                state.members.remove(&id);
                return Ok(Some(id));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .map_err(|_| MergeError::Store("queue lock poisoned".to_string()))?
                .0;
        }
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock()?.order.len())
    }

    fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
        self.ready.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or(true)
    }
}
