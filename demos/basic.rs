//! Basic example of running a batch of tasks with bounded concurrency.
//!
//! Run with: `RUST_LOG=taskflow=debug cargo run --example basic`
//!
//! Concurrency and debug logging can be set through the environment:
//! `TASKFLOW_MAX_CONCURRENCY=2 TASKFLOW_DEBUG=1 cargo run --example basic`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use taskflow::{
    task_fn, RetryPolicy, Retrying, Runner, RunnerConfig, Task, TaskContext, TaskError,
    TracingObserver,
};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Tasks
// ============================================================================

/// Pretends to download a file.
struct Download {
    name: String,
    millis: u64,
}

#[async_trait]
impl Task for Download {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cx: TaskContext) -> Result<(), TaskError> {
        tokio::select! {
            _ = cx.cancellation().cancelled() => Err(TaskError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(self.millis)) => {
                if self.name.ends_with("missing") {
                    Err(TaskError::permanent(anyhow::anyhow!("404 not found")))
                } else {
                    Ok(())
                }
            }
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("taskflow=info".parse()?))
        .init();

    let config = RunnerConfig::from_env()?;
    let runner = Runner::builder()
        .config(config)
        .observer(TracingObserver)
        .build()?;

    let failures = Arc::new(AtomicUsize::new(0));
    {
        let failures = failures.clone();
        runner.on_task_error(move |_, _| {
            failures.fetch_add(1, Ordering::SeqCst);
        });
    }

    for i in 0..12 {
        let name = if i == 7 {
            format!("file_{}_missing", i)
        } else {
            format!("file_{}", i)
        };
        runner.submit(Download {
            name,
            millis: 50 + (i % 4) * 25,
        });
    }

    // A flaky upload that succeeds on its third attempt.
    let attempts = Arc::new(AtomicUsize::new(0));
    runner.submit(Retrying::new(
        task_fn("upload_report", move |_cx| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(TaskError::retryable(anyhow::anyhow!("connection reset")))
                } else {
                    Ok(())
                }
            }
        }),
        RetryPolicy::exponential(4),
    ));

    println!(
        "Submitted 13 tasks, {} workers active, {} queued",
        runner.active_workers(),
        runner.pending()
    );

    runner.wait_for_idle().await;

    println!(
        "All tasks finished with {} failure(s)",
        failures.load(Ordering::SeqCst)
    );
    Ok(())
}
