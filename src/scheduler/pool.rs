//! Task pools - batch execution with guaranteed result accounting
//!
//! Two pools share one contract: submit a `TaskBatch`, get a `BatchHandle`,
//! join it to receive exactly one `TaskResult` per submitted task in
//! submission order. Nothing is retained between batches; a handle is
//! consumed by `join`, so stale results cannot leak into a later cycle.
//!
//! - `SerialPool` runs the batch strictly sequentially. A task only starts
//!   after its predecessor has finished.
//! - `ConcurrentPool` runs the batch across a bounded set of workers.
//!   Completion order is arbitrary, result order is not.
//!
//! Every job is isolated in its own spawned task: a panic inside one job
//! surfaces as `TaskError::Panicked` in its own slot and leaves siblings
//! untouched. `join` bounds the whole batch with `MAX_TASK_TIMEOUT`; slots
//! still outstanding at the deadline are reported as `TaskError::Timeout`,
//! again without losing the 1:1 mapping. A command already dispatched to
//! the runner is not cancelled mid-flight; the runner's own timeout bounds
//! it. Jobs still queued behind the worker bound at the deadline never
//! dispatch at all.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::{TaskError, TaskOutcome};
use super::task::CollectTask;
use super::trigger::TriggerHandle;
use crate::executor::CommandRunner;

/// Upper bound on how long a batch may stay outstanding.
pub const MAX_TASK_TIMEOUT: Duration = Duration::from_secs(600);

/// Outcome of one task, tagged with its origin so callers can re-associate
/// results regardless of execution order.
#[derive(Debug)]
pub struct TaskResult {
    /// Qualified task name (`module.tag`).
    pub name: String,

    /// Report key the value belongs under.
    pub tag: String,

    pub outcome: TaskOutcome,
}

struct Job {
    name: String,
    tag: String,
    fut: BoxFuture<'static, TaskOutcome>,
}

/// An ordered set of jobs waiting to be handed to a pool.
#[derive(Default)]
pub struct TaskBatch {
    jobs: Vec<Job>,
}

impl TaskBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an arbitrary future under a name and tag.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        tag: impl Into<String>,
        fut: BoxFuture<'static, TaskOutcome>,
    ) {
        self.jobs.push(Job {
            name: name.into(),
            tag: tag.into(),
            fut,
        });
    }

    /// Queue a registered collection task bound to a runner and an optional
    /// trigger gate.
    pub fn add_task(
        &mut self,
        task: Arc<CollectTask>,
        runner: Arc<dyn CommandRunner>,
        gate: Option<TriggerHandle>,
    ) {
        let name = task.name().to_string();
        let tag = task.tag().to_string();
        let fut = async move { task.run(runner.as_ref(), gate.as_ref()).await }.boxed();
        self.add(name, tag, fut);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Strictly sequential executor.
pub struct SerialPool;

impl SerialPool {
    /// Start the batch. Jobs run one after another on a driver task; each
    /// job is additionally spawned on its own so a panic cannot take the
    /// driver down with it.
    pub fn run_batch(batch: TaskBatch) -> BatchHandle {
        let labels = labels_of(&batch);
        let (tx, rx) = mpsc::unbounded_channel();

        debug!("serial batch of {} started", batch.len());
        let driver = tokio::spawn(async move {
            for (index, job) in batch.jobs.into_iter().enumerate() {
                let outcome = match tokio::spawn(job.fut).await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(panic_error(&job.name, e)),
                };
                if tx.send((index, outcome)).is_err() {
                    // Handle dropped or timed out, nobody is listening.
                    return;
                }
            }
        });

        BatchHandle {
            labels,
            mode: HandleMode::Serial { driver, rx },
        }
    }
}

/// Bounded concurrent executor.
pub struct ConcurrentPool {
    permits: Arc<Semaphore>,
}

impl ConcurrentPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    /// Start the batch. All jobs are spawned immediately and contend for
    /// the pool's worker permits.
    pub fn run_batch(&self, batch: TaskBatch) -> BatchHandle {
        let labels = labels_of(&batch);
        let expired = Arc::new(AtomicBool::new(false));

        debug!("concurrent batch of {} started", batch.len());
        let handles = batch
            .jobs
            .into_iter()
            .map(|job| {
                let permits = Arc::clone(&self.permits);
                let expired = Arc::clone(&expired);
                tokio::spawn(async move {
                    // The semaphore is never closed, acquire only fails
                    // after close.
                    let _permit = permits.acquire_owned().await.ok();
                    if expired.load(Ordering::SeqCst) {
                        // Deadline passed while queued; the slot is
                        // already reported as timed out.
                        return Err(TaskError::Timeout);
                    }
                    job.fut.await
                })
            })
            .collect();

        BatchHandle {
            labels,
            mode: HandleMode::Concurrent { handles, expired },
        }
    }
}

enum HandleMode {
    Serial {
        driver: JoinHandle<()>,
        rx: mpsc::UnboundedReceiver<(usize, TaskOutcome)>,
    },
    Concurrent {
        handles: Vec<JoinHandle<TaskOutcome>>,
        expired: Arc<AtomicBool>,
    },
}

/// A running batch. Consumed by `join`; one handle, one result set.
pub struct BatchHandle {
    labels: Vec<(String, String)>,
    mode: HandleMode,
}

impl BatchHandle {
    /// Wait for every job and return their results in submission order.
    ///
    /// The whole batch is bounded by `MAX_TASK_TIMEOUT`; jobs that have not
    /// finished by then are reported as `TaskError::Timeout` and their slots
    /// never overwrite a later cycle.
    pub async fn join(self) -> Vec<TaskResult> {
        self.join_within(MAX_TASK_TIMEOUT).await
    }

    async fn join_within(self, timeout: Duration) -> Vec<TaskResult> {
        let deadline = Instant::now() + timeout;
        let expected = self.labels.len();
        let mut outcomes: Vec<Option<TaskOutcome>> = (0..expected).map(|_| None).collect();

        match self.mode {
            HandleMode::Serial { driver, mut rx } => {
                let mut received = 0;
                while received < expected {
                    match tokio::time::timeout_at(deadline, rx.recv()).await {
                        Ok(Some((index, outcome))) => {
                            outcomes[index] = Some(outcome);
                            received += 1;
                        }
                        // Driver gone without delivering everything.
                        Ok(None) => break,
                        Err(_) => {
                            warn!("serial batch exceeded {timeout:?}, remaining jobs never start");
                            driver.abort();
                            break;
                        }
                    }
                }
            }
            HandleMode::Concurrent { handles, expired } => {
                for (index, mut handle) in handles.into_iter().enumerate() {
                    match tokio::time::timeout_at(deadline, &mut handle).await {
                        Ok(Ok(outcome)) => outcomes[index] = Some(outcome),
                        Ok(Err(e)) => {
                            outcomes[index] = Some(Err(panic_error(&self.labels[index].0, e)));
                        }
                        Err(_) => {
                            warn!(
                                "{} still outstanding at the batch deadline",
                                self.labels[index].0
                            );
                            // The handle is detached, not aborted: a command
                            // in flight runs to the runner's own timeout.
                            // Jobs still queued see the flag and never start.
                            expired.store(true, Ordering::SeqCst);
                        }
                    }
                }
            }
        }

        self.labels
            .into_iter()
            .zip(outcomes)
            .map(|((name, tag), outcome)| TaskResult {
                name,
                tag,
                outcome: outcome.unwrap_or(Err(TaskError::Timeout)),
            })
            .collect()
    }
}

fn labels_of(batch: &TaskBatch) -> Vec<(String, String)> {
    batch
        .jobs
        .iter()
        .map(|job| (job.name.clone(), job.tag.clone()))
        .collect()
}

fn panic_error(name: &str, e: JoinError) -> TaskError {
    warn!("{name} crashed: {e}");
    TaskError::Panicked(e.to_string())
}
