//! Worker drain loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, warn};

use super::runner::Shared;
use super::state::{Abandon, Dequeue};
use crate::task::{TaskContext, TaskError};

/// Holds a worker's slot until the worker retires through the queue.
///
/// If the worker future unwinds or is dropped first, the slot goes to a
/// replacement worker while tasks are queued. Otherwise it is released, and
/// the last one out signals idle.
struct SlotGuard {
    shared: Arc<Shared>,
    worker_id: u64,
    armed: bool,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(worker_id = self.worker_id, "Worker stopped before draining the queue");
        match self.shared.state.abandon() {
            Abandon::Handoff => self.shared.spawn_worker(),
            Abandon::Released {
                idle_epoch: Some(epoch),
            } => signal_idle(&self.shared, self.worker_id, epoch),
            Abandon::Released { idle_epoch: None } => {}
        }
    }
}

/// Run queued tasks one at a time until the queue is empty, then retire.
pub(crate) async fn drain(shared: Arc<Shared>, worker_id: u64) {
    let mut slot = SlotGuard {
        shared: shared.clone(),
        worker_id,
        armed: true,
    };

    if shared.debug_logging {
        debug!(worker_id, "Worker starting");
    }

    let idle_epoch = loop {
        let task = match shared.state.next_or_retire() {
            Dequeue::Task(task) => task,
            Dequeue::Retired { idle_epoch } => {
                slot.armed = false;
                break idle_epoch;
            }
        };

        let cx = TaskContext::new(worker_id, shared.cancel.child_token());
        // `run` is called inside the guarded future so a panic while building
        // the task's future is caught as well.
        let outcome = AssertUnwindSafe(async { task.run(cx).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload))));

        match outcome {
            Ok(()) => {
                if shared.debug_logging {
                    debug!(worker_id, task = task.name(), "Task completed successfully");
                }
                shared.observers.task_complete(&*task);
            }
            Err(err) => {
                warn!(worker_id, task = task.name(), error = %err, "Error while executing task");
                shared.observers.task_error(&*task, &err);
            }
        }
    };

    if shared.debug_logging {
        debug!(worker_id, "Worker stopping");
    }

    if let Some(epoch) = idle_epoch {
        signal_idle(&shared, worker_id, epoch);
    }
}

/// Run idle observers, then release `wait_for_idle` callers.
fn signal_idle(shared: &Shared, worker_id: u64, epoch: u64) {
    if shared.debug_logging {
        debug!(worker_id, epoch, "Last worker retired, runner is idle");
    }
    shared.observers.all_tasks_completed();
    shared.publish_idle(epoch);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
