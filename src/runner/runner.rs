//! Runner that queues submitted tasks and drains them with bounded concurrency.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::state::State;
use super::worker;
use crate::config::{ConfigError, RunnerConfig};
use crate::observer::{FnObserver, Observers, RunnerObserver};
use crate::task::{Task, TaskError};

/// Error returned when constructing a [`Runner`].
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Workers are tokio tasks, so a runtime must be available.
    #[error("no tokio runtime available; build the runner inside a runtime or pass a handle")]
    NoRuntime,
}

/// State shared by the runner handle and its workers.
pub(crate) struct Shared {
    pub(crate) state: State,
    pub(crate) observers: Observers,
    pub(crate) cancel: CancellationToken,
    pub(crate) debug_logging: bool,
    idle_tx: watch::Sender<u64>,
    next_worker_id: AtomicU64,
    handle: Handle,
}

impl Shared {
    /// Release `wait_for_idle` callers waiting on epochs before `epoch`.
    pub(crate) fn publish_idle(&self, epoch: u64) {
        self.idle_tx.send_if_modified(|current| {
            if epoch > *current {
                *current = epoch;
                true
            } else {
                false
            }
        });
    }

    /// Start a worker for a slot the caller has already claimed.
    pub(crate) fn spawn_worker(self: &Arc<Self>) {
        let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed) + 1;
        if self.debug_logging {
            debug!(worker_id, "Spawning new worker");
        }
        self.handle.spawn(worker::drain(self.clone(), worker_id));
    }
}

/// Executes submitted tasks with at most `max_concurrency` running at once.
///
/// Tasks wait in a FIFO queue. Each [`submit`](Runner::submit) starts a new
/// worker if fewer than `max_concurrency` are active; a worker runs queued
/// tasks one after the other and retires when it finds the queue empty.
///
/// Task failures are only reported through [`RunnerObserver::on_task_error`].
/// A caller that never subscribes never learns that a task failed.
///
/// The runner is a cheap handle; clones share the same queue and workers.
#[derive(Clone)]
pub struct Runner {
    shared: Arc<Shared>,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("max_concurrency", &self.max_concurrency())
            .field("active_workers", &self.active_workers())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Runner {
    /// Create a runner from a configuration, on the current tokio runtime.
    pub fn new(config: RunnerConfig) -> Result<Self, RunnerError> {
        RunnerBuilder::new().config(config).build()
    }

    /// Create a builder.
    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::new()
    }

    /// Queue a task and start a worker if there is headroom.
    ///
    /// Returns immediately. The task's outcome is delivered to observers.
    /// After [`cancel`](Runner::cancel) the task still runs, but its context
    /// is already cancelled.
    pub fn submit(&self, task: impl Task + 'static) {
        self.submit_boxed(Box::new(task));
    }

    /// Queue an already boxed task.
    pub fn submit_boxed(&self, task: Box<dyn Task>) {
        if self.shared.debug_logging {
            debug!(task = task.name(), "Task submitted");
        }
        if self.shared.state.push(task) {
            self.shared.spawn_worker();
        }
    }

    /// True when no worker is active and the queue is empty.
    pub fn is_idle(&self) -> bool {
        self.shared.state.is_idle()
    }

    /// Resolve at the next idle transition, or immediately if already idle.
    ///
    /// The runner's state is sampled when this method is called, not when the
    /// returned future is first polled. Every waiter registered before a
    /// transition is released by it, after the `on_all_tasks_completed`
    /// observers have run.
    pub fn wait_for_idle(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shared.idle_tx.subscribe();
        let busy_since = self.shared.state.busy_epoch();

        async move {
            let Some(seen) = busy_since else {
                return;
            };
            // Err means every sender is gone, i.e. the runtime dropped the workers.
            let _ = rx.wait_for(|epoch| *epoch > seen).await;
        }
    }

    /// Register an observer. It only sees events emitted after this call.
    pub fn subscribe(&self, observer: Arc<dyn RunnerObserver>) {
        self.shared.observers.push(observer);
    }

    /// Subscribe a closure to task completions.
    pub fn on_task_complete(&self, f: impl Fn(&dyn Task) + Send + Sync + 'static) {
        self.subscribe(Arc::new(FnObserver::new().with_task_complete(f)));
    }

    /// Subscribe a closure to task failures.
    pub fn on_task_error(&self, f: impl Fn(&dyn Task, &TaskError) + Send + Sync + 'static) {
        self.subscribe(Arc::new(FnObserver::new().with_task_error(f)));
    }

    /// Subscribe a closure to idle transitions.
    pub fn on_all_tasks_completed(&self, f: impl Fn() + Send + Sync + 'static) {
        self.subscribe(Arc::new(FnObserver::new().with_all_tasks_completed(f)));
    }

    /// Number of registered observers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.observers.len()
    }

    /// Ask running and queued tasks to stop.
    ///
    /// Queued tasks are still dequeued and run, with an already cancelled
    /// context, so every submitted task is still reported to observers.
    ///
    /// Cancellation cannot be undone. Every task submitted afterwards also
    /// starts with a cancelled context; build a new runner to resume work.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    /// Parent of every task's cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Configured concurrency ceiling.
    pub fn max_concurrency(&self) -> usize {
        self.shared.state.max_concurrency()
    }

    /// Workers currently draining the queue.
    pub fn active_workers(&self) -> usize {
        self.shared.state.active_workers()
    }

    /// Tasks waiting to be picked up by a worker.
    pub fn pending(&self) -> usize {
        self.shared.state.pending()
    }
}

/// Builder for constructing a Runner.
pub struct RunnerBuilder {
    config: RunnerConfig,
    observers: Vec<Arc<dyn RunnerObserver>>,
    handle: Option<Handle>,
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: RunnerConfig::default(),
            observers: Vec::new(),
            handle: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the maximum number of concurrently running tasks.
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n;
        self
    }

    /// Log worker lifecycle and task completion at debug level.
    pub fn debug_logging(mut self, enabled: bool) -> Self {
        self.config.debug_logging = enabled;
        self
    }

    /// Register an observer before any task can run.
    pub fn observer(mut self, observer: impl RunnerObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Spawn workers on this runtime instead of the current one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Build the runner.
    pub fn build(self) -> Result<Runner, RunnerError> {
        self.config.validate()?;

        let handle = match self.handle {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| RunnerError::NoRuntime)?,
        };

        let (idle_tx, _) = watch::channel(0);

        Ok(Runner {
            shared: Arc::new(Shared {
                state: State::new(self.config.max_concurrency),
                observers: Observers::new(self.observers),
                cancel: CancellationToken::new(),
                debug_logging: self.config.debug_logging,
                idle_tx,
                next_worker_id: AtomicU64::new(0),
                handle,
            }),
        })
    }
}
