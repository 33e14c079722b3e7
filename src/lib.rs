//! # Taskflow
//!
//! Bounded-concurrency task runner for tokio applications.
//!
//! Submit any number of tasks; at most `max_concurrency` of them run at once
//! and the rest wait in a FIFO queue. Workers are started on demand when work
//! arrives and retire as soon as the queue is empty, so an idle runner costs
//! nothing.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use taskflow::{task_fn, Runner, TaskError};
//!
//! let runner = Runner::builder().max_concurrency(4).build()?;
//!
//! runner.on_task_error(|task, err| eprintln!("{} failed: {}", task.name(), err));
//!
//! for url in urls {
//!     runner.submit(task_fn(url.clone(), move |_cx| {
//!         let url = url.clone();
//!         async move { fetch(&url).await.map_err(TaskError::retryable) }
//!     }));
//! }
//!
//! runner.wait_for_idle().await;
//! ```
//!
//! ## Observing outcomes
//!
//! Failures never stop a worker and are never returned to the submitter. They
//! are delivered to [`RunnerObserver::on_task_error`]; subscribe before
//! submitting or failures go unnoticed. [`TracingObserver`] forwards every
//! event to `tracing`.
//!
//! ## Backpressure
//!
//! The queue is unbounded. Producers that can outrun the workers should await
//! [`Runner::wait_for_idle`] between batches.
//!
//! ## Retries
//!
//! The runner reports each failure once. Wrap a task in [`Retrying`] to re-run
//! it on [`TaskError::Retryable`] with a [`RetryPolicy`].

pub mod config;
pub mod observer;
pub mod retry;
pub mod runner;
pub mod task;

pub use config::{ConfigError, RunnerConfig};
pub use observer::{FnObserver, NoopObserver, RunnerObserver, TracingObserver};
pub use retry::{RetryPolicy, Retrying};
pub use runner::{Runner, RunnerBuilder, RunnerError};
pub use task::{task_fn, FnTask, Task, TaskContext, TaskError};
