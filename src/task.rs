//! Task trait and error types.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error returned by a task execution.
#[derive(Error, Debug)]
pub enum TaskError {
    /// Transient failure - a [`Retrying`](crate::Retrying) wrapper may run the task again.
    #[error("retryable: {0}")]
    Retryable(#[source] anyhow::Error),

    /// Permanent failure - won't succeed on retry.
    #[error("permanent: {0}")]
    Permanent(#[source] anyhow::Error),

    /// The task panicked while running.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task observed cancellation and gave up.
    #[error("task cancelled")]
    Cancelled,
}

impl TaskError {
    /// Create a retryable error.
    pub fn retryable(err: impl Into<anyhow::Error>) -> Self {
        Self::Retryable(err.into())
    }

    /// Create a permanent error.
    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        Self::Permanent(err.into())
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Per-execution context handed to [`Task::run`].
#[derive(Debug, Clone)]
pub struct TaskContext {
    worker_id: u64,
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(worker_id: u64, cancel: CancellationToken) -> Self {
        Self { worker_id, cancel }
    }

    /// Diagnostic label of the worker running this task.
    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// Token cancelled when [`Runner::cancel`](crate::Runner::cancel) is called.
    ///
    /// Long-running tasks should select on [`CancellationToken::cancelled`]
    /// and return [`TaskError::Cancelled`].
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Shorthand for `self.cancellation().is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A unit of work submitted to a [`Runner`](crate::Runner).
#[async_trait]
pub trait Task: Send + Sync {
    /// Label used in logs and notifications.
    fn name(&self) -> &str;

    /// Run the task to completion.
    async fn run(&self, cx: TaskContext) -> Result<(), TaskError>;
}

#[async_trait]
impl<T: Task + ?Sized> Task for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn run(&self, cx: TaskContext) -> Result<(), TaskError> {
        (**self).run(cx).await
    }
}

/// A [`Task`] backed by an async closure. Built with [`task_fn`].
pub struct FnTask<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FnTask<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask").field("name", &self.name).finish()
    }
}

/// Build a task from a name and an async closure.
///
/// ```rust,ignore
/// runner.submit(task_fn("fetch", |_cx| async move {
///     fetch().await.map_err(TaskError::retryable)
/// }));
/// ```
pub fn task_fn<F, Fut>(name: impl Into<String>, f: F) -> FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    FnTask {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cx: TaskContext) -> Result<(), TaskError> {
        (self.f)(cx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_task_runs_closure() {
        let task = task_fn("double", |cx: TaskContext| async move {
            assert_eq!(cx.worker_id(), 7);
            Ok(())
        });

        assert_eq!(task.name(), "double");
        let cx = TaskContext::new(7, CancellationToken::new());
        assert!(task.run(cx).await.is_ok());
    }

    #[tokio::test]
    async fn test_boxed_task_delegates() {
        let task: Box<dyn Task> = Box::new(task_fn("boom", |_cx| async {
            Err(TaskError::permanent(anyhow::anyhow!("boom")))
        }));

        assert_eq!(task.name(), "boom");
        let err = task
            .run(TaskContext::new(1, CancellationToken::new()))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "permanent: boom");
    }

    #[test]
    fn test_error_constructors() {
        assert!(TaskError::retryable(anyhow::anyhow!("flaky")).is_retryable());
        assert!(!TaskError::Cancelled.is_retryable());
        assert_eq!(
            TaskError::Panicked("oops".into()).to_string(),
            "task panicked: oops"
        );
    }
}
