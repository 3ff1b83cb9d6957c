//! Collection task scheduling
//!
//! This module implements the scheduling core: tasks declare how they want
//! to run (serial or concurrent, immediately or gated on an external
//! trigger), a registry groups them by module, and a manager walks the
//! buckets in a fixed order and folds the results into one report.
//!
//! ## Architecture Overview
//!
//! ```text
//!                   ┌─────────────────┐
//!                   │   TaskManager   │
//!                   └────────┬────────┘
//!                            │ per-module buckets
//!          ┌─────────────────┼─────────────────┐
//!          ▼                 ▼                 ▼
//!    sync + direct    sync + triggered     async (all)
//!    (SerialPool)     (SerialPool after   (ConcurrentPool,
//!                      gate pre-check)     tasks self-gate)
//!          │                 │                 │
//!          └─────────────────┼─────────────────┘
//!                            ▼
//!                     ┌─────────────┐       ┌───────────────┐
//!                     │ CollectTask │ ────► │ CommandRunner │
//!                     └──────┬──────┘       └───────────────┘
//!                            │ waits on
//!                     ┌──────▼──────┐
//!                     │ TriggerGate │ (background signal poller)
//!                     └─────────────┘
//! ```
//!
//! ## Components
//!
//! - **TaskRegistry**: explicit registration of tasks with their execution
//!   policy; validates sampling bounds and rejects duplicate tags
//! - **TriggerGate**: tri-state rendezvous (waiting / triggered / close)
//!   backed by a poller that watches a signal file through the runner
//! - **SerialPool / ConcurrentPool**: batch executors with a shared
//!   contract, one `TaskResult` per submitted task, always
//! - **TaskManager**: bucket ordering, gate pre-checks and report folding
//!
//! ## Communication Patterns
//!
//! 1. **Status**: the gate publishes its state over a watch channel;
//!    waiters observe the same transition exactly once
//! 2. **Commands**: the gate accepts control messages (shutdown) over an
//!    mpsc channel
//! 3. **Batches**: pools hand back a `BatchHandle` that is consumed by
//!    `join`, so results can never leak between cycles

pub mod error;
pub mod manager;
pub mod pool;
pub mod registry;
pub mod task;
pub mod trigger;

pub use error::{TaskError, TaskOutcome};
pub use manager::{Report, TaskManager};
pub use pool::{BatchHandle, ConcurrentPool, MAX_TASK_TIMEOUT, SerialPool, TaskBatch, TaskResult};
pub use registry::{
    CollectMode, CollectType, MAX_SAMPLE_COUNT, MAX_SAMPLE_INTERVAL, Sampling, TaskRegistry,
    TaskSpec,
};
pub use task::CollectTask;
pub use trigger::{TriggerGate, TriggerHandle, TriggerStatus};
