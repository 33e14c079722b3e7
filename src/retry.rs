//! Caller-side retry wrapper.
//!
//! The runner never retries on its own: a failed task is reported once through
//! [`RunnerObserver::on_task_error`](crate::RunnerObserver::on_task_error).
//! Wrap a task in [`Retrying`] to re-run it on [`TaskError::Retryable`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::task::{Task, TaskContext, TaskError};

/// How many times to re-run a failing task and how long to wait in between.
#[derive(Debug, Clone, Default)]
pub enum RetryPolicy {
    /// Fail on the first error.
    #[default]
    None,

    /// Constant delay between attempts.
    Fixed {
        /// Retries after the first attempt.
        max_retries: u32,
        delay: Duration,
    },

    /// Doubling delay between attempts.
    Exponential {
        /// Retries after the first attempt.
        max_retries: u32,
        /// Delay before the first retry.
        initial_delay: Duration,
        /// Upper bound on any single delay.
        max_delay: Duration,
    },
}

impl RetryPolicy {
    /// Exponential backoff starting at 100ms, capped at 30 seconds.
    pub fn exponential(max_retries: u32) -> Self {
        Self::Exponential {
            max_retries,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Constant delay between retries.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self::Fixed { max_retries, delay }
    }

    /// Delay before retry number `retry` (1-indexed), or `None` once retries
    /// are used up.
    pub fn backoff(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.max_retries() {
            return None;
        }
        match self {
            Self::None => None,
            Self::Fixed { delay, .. } => Some(*delay),
            Self::Exponential {
                initial_delay,
                max_delay,
                ..
            } => {
                let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
                Some(initial_delay.saturating_mul(factor).min(*max_delay))
            }
        }
    }

    /// Retries allowed after the first attempt.
    pub fn max_retries(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Fixed { max_retries, .. } | Self::Exponential { max_retries, .. } => *max_retries,
        }
    }
}

/// A task that re-runs its inner task on retryable errors.
///
/// Permanent errors, panics and cancellation are returned immediately. The
/// backoff sleep is cut short if the runner is cancelled.
#[derive(Debug)]
pub struct Retrying<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Task> Retrying<T> {
    /// Wrap `inner` with the given policy.
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped task.
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Task> Task for Retrying<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, cx: TaskContext) -> Result<(), TaskError> {
        let mut retry = 0;
        loop {
            let err = match self.inner.run(cx.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(err),
            };

            retry += 1;
            let Some(delay) = self.policy.backoff(retry) else {
                return Err(err);
            };

            debug!(
                task = self.inner.name(),
                retry,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying task"
            );

            tokio::select! {
                _ = cx.cancellation().cancelled() => return Err(TaskError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
