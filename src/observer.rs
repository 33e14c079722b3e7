//! Notification interface for runner lifecycle events.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{error, info, warn};

use crate::task::{Task, TaskError};

/// Receives runner lifecycle notifications.
///
/// All methods default to no-ops, so implementors only override the events
/// they care about. Callbacks run synchronously on the worker that produced
/// the event; keep them short.
pub trait RunnerObserver: Send + Sync {
    /// A task's `run` returned `Ok`.
    fn on_task_complete(&self, _task: &dyn Task) {}

    /// A task's `run` returned an error or panicked.
    fn on_task_error(&self, _task: &dyn Task, _error: &TaskError) {}

    /// The last active worker retired with an empty queue.
    fn on_all_tasks_completed(&self) {}
}

/// An observer that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopObserver;

impl RunnerObserver for NoopObserver {}

/// An observer that formats every event through `tracing`.
///
/// Useful when the application already has a subscriber installed and just
/// wants task outcomes in its logs.
#[derive(Debug, Clone, Default)]
pub struct TracingObserver;

impl RunnerObserver for TracingObserver {
    fn on_task_complete(&self, task: &dyn Task) {
        info!(task = task.name(), "Task completed");
    }

    fn on_task_error(&self, task: &dyn Task, error: &TaskError) {
        warn!(task = task.name(), error = %error, "Task failed");
    }

    fn on_all_tasks_completed(&self) {
        info!("All tasks completed");
    }
}

type CompleteFn = Box<dyn Fn(&dyn Task) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&dyn Task, &TaskError) + Send + Sync>;
type IdleFn = Box<dyn Fn() + Send + Sync>;

/// Observer assembled from closures, one per event kind.
#[derive(Default)]
pub struct FnObserver {
    complete: Option<CompleteFn>,
    error: Option<ErrorFn>,
    idle: Option<IdleFn>,
}

impl FnObserver {
    /// Create an observer with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task-complete callback.
    pub fn with_task_complete(mut self, f: impl Fn(&dyn Task) + Send + Sync + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }

    /// Set the task-error callback.
    pub fn with_task_error(
        mut self,
        f: impl Fn(&dyn Task, &TaskError) + Send + Sync + 'static,
    ) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Set the all-tasks-completed callback.
    pub fn with_all_tasks_completed(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.idle = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for FnObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObserver")
            .field("complete", &self.complete.is_some())
            .field("error", &self.error.is_some())
            .field("idle", &self.idle.is_some())
            .finish()
    }
}

impl RunnerObserver for FnObserver {
    fn on_task_complete(&self, task: &dyn Task) {
        if let Some(f) = &self.complete {
            f(task);
        }
    }

    fn on_task_error(&self, task: &dyn Task, error: &TaskError) {
        if let Some(f) = &self.error {
            f(task, error);
        }
    }

    fn on_all_tasks_completed(&self) {
        if let Some(f) = &self.idle {
            f();
        }
    }
}

/// Ordered list of subscribers.
///
/// Dispatch snapshots the list first so a callback may subscribe further
/// observers without deadlocking; those only see later events. A panicking
/// observer is logged and skipped so it cannot take its worker down.
#[derive(Default)]
pub(crate) struct Observers {
    inner: RwLock<Vec<Arc<dyn RunnerObserver>>>,
}

impl Observers {
    pub(crate) fn new(initial: Vec<Arc<dyn RunnerObserver>>) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    pub(crate) fn push(&self, observer: Arc<dyn RunnerObserver>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn RunnerObserver>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn dispatch(&self, event: &'static str, f: impl Fn(&dyn RunnerObserver)) {
        for observer in self.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| f(observer.as_ref()))).is_err() {
                error!(event, "Observer panicked");
            }
        }
    }

    pub(crate) fn task_complete(&self, task: &dyn Task) {
        self.dispatch("task_complete", |o| o.on_task_complete(task));
    }

    pub(crate) fn task_error(&self, task: &dyn Task, error: &TaskError) {
        self.dispatch("task_error", |o| o.on_task_error(task, error));
    }

    pub(crate) fn all_tasks_completed(&self) {
        self.dispatch("all_tasks_completed", |o| o.on_all_tasks_completed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::task_fn;
    use std::sync::Mutex;

    #[test]
    fn test_dispatch_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observers = Observers::default();

        for label in ["first", "second", "third"] {
            let seen = seen.clone();
            observers.push(Arc::new(
                FnObserver::new().with_all_tasks_completed(move || seen.lock().unwrap().push(label)),
            ));
        }

        observers.all_tasks_completed();
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_fn_observer_routes_by_event() {
        let completed = Arc::new(Mutex::new(Vec::new()));
        let failed = Arc::new(Mutex::new(Vec::new()));

        let observer = FnObserver::new()
            .with_task_complete({
                let completed = completed.clone();
                move |task| completed.lock().unwrap().push(task.name().to_string())
            })
            .with_task_error({
                let failed = failed.clone();
                move |task, err| failed.lock().unwrap().push(format!("{}: {}", task.name(), err))
            });

        let task = task_fn("t1", |_cx| async { Ok(()) });
        observer.on_task_complete(&task);
        observer.on_task_error(&task, &crate::TaskError::Cancelled);
        observer.on_all_tasks_completed();

        assert_eq!(*completed.lock().unwrap(), vec!["t1"]);
        assert_eq!(*failed.lock().unwrap(), vec!["t1: task cancelled"]);
    }

    #[test]
    fn test_panicking_observer_does_not_stop_dispatch() {
        let reached = Arc::new(Mutex::new(false));
        let observers = Observers::new(vec![
            Arc::new(FnObserver::new().with_all_tasks_completed(|| panic!("bad observer")))
                as Arc<dyn RunnerObserver>,
            Arc::new(FnObserver::new().with_all_tasks_completed({
                let reached = reached.clone();
                move || *reached.lock().unwrap() = true
            })),
        ]);

        observers.all_tasks_completed();
        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn test_subscribe_during_dispatch_sees_only_later_events() {
        let observers = Arc::new(Observers::default());
        let late_calls = Arc::new(Mutex::new(0));

        {
            let registry = observers.clone();
            let late_calls = late_calls.clone();
            observers.push(Arc::new(FnObserver::new().with_all_tasks_completed(move || {
                let late_calls = late_calls.clone();
                registry.push(Arc::new(
                    FnObserver::new().with_all_tasks_completed(move || *late_calls.lock().unwrap() += 1),
                ));
            })));
        }

        observers.all_tasks_completed();
        assert_eq!(*late_calls.lock().unwrap(), 0);
        assert_eq!(observers.len(), 2);

        observers.all_tasks_completed();
        assert_eq!(*late_calls.lock().unwrap(), 1);
    }
}
