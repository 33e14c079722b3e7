//! Shared queue and worker bookkeeping.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::task::Task;

/// What a worker should do after checking the queue.
pub(crate) enum Dequeue {
    /// Run this task next.
    Task(Box<dyn Task>),
    /// Queue was empty and the worker has been retired. `idle_epoch` is set
    /// when it was the last one out.
    Retired { idle_epoch: Option<u64> },
}

/// Outcome of giving up a slot held by a worker that stopped early.
pub(crate) enum Abandon {
    /// Work is still queued; the slot stays claimed for a replacement worker.
    Handoff,
    /// The slot was released, as in [`Dequeue::Retired`].
    Released { idle_epoch: Option<u64> },
}

/// State that every submit and every worker touches.
///
/// Each method is a single critical section. Nothing awaits while the lock is
/// held.
pub(crate) struct State {
    inner: Mutex<Inner>,
    max_concurrency: usize,
}

struct Inner {
    queue: VecDeque<Box<dyn Task>>,
    active_workers: usize,
    idle_epoch: u64,
}

impl Inner {
    /// Drop one active worker. Returns the new epoch if that emptied the pool.
    fn retire(&mut self) -> Option<u64> {
        debug_assert!(self.active_workers > 0, "retiring with no active workers");
        self.active_workers = self.active_workers.saturating_sub(1);
        if self.active_workers > 0 {
            return None;
        }
        self.idle_epoch += 1;
        Some(self.idle_epoch)
    }
}

impl State {
    pub(crate) fn new(max_concurrency: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                active_workers: 0,
                idle_epoch: 0,
            }),
            max_concurrency,
        }
    }

    // Tasks never run while this lock is held, so a poisoned lock still
    // guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Append a task and claim a worker slot if one is free.
    ///
    /// Returns true when the caller must start a worker for the claimed slot.
    pub(crate) fn push(&self, task: Box<dyn Task>) -> bool {
        let mut inner = self.lock();
        inner.queue.push_back(task);
        if inner.active_workers < self.max_concurrency {
            inner.active_workers += 1;
            true
        } else {
            false
        }
    }

    /// Pop the next task, or retire the calling worker if there is none.
    ///
    /// The empty check and the retirement happen under one lock, so a task
    /// pushed concurrently either lands before the check or sees the freed
    /// slot and starts a new worker.
    pub(crate) fn next_or_retire(&self) -> Dequeue {
        let mut inner = self.lock();
        if let Some(task) = inner.queue.pop_front() {
            return Dequeue::Task(task);
        }

        Dequeue::Retired {
            idle_epoch: inner.retire(),
        }
    }

    /// Release the slot of a worker that unwound or was dropped mid-loop.
    pub(crate) fn abandon(&self) -> Abandon {
        let mut inner = self.lock();
        if inner.queue.is_empty() {
            Abandon::Released {
                idle_epoch: inner.retire(),
            }
        } else {
            Abandon::Handoff
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        let inner = self.lock();
        inner.active_workers == 0 && inner.queue.is_empty()
    }

    /// Idle transitions seen so far, or `None` if the runner is idle right now.
    pub(crate) fn busy_epoch(&self) -> Option<u64> {
        let inner = self.lock();
        if inner.active_workers == 0 && inner.queue.is_empty() {
            None
        } else {
            Some(inner.idle_epoch)
        }
    }

    pub(crate) fn active_workers(&self) -> usize {
        self.lock().active_workers
    }

    pub(crate) fn pending(&self) -> usize {
        self.lock().queue.len()
    }
}
