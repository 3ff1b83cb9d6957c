//! Task manager - per-module orchestration of registered tasks
//!
//! For every module the manager walks three buckets in a fixed order:
//!
//! 1. sync + direct, on the serial pool
//! 2. sync + triggered, on the serial pool, but only after the trigger
//!    gate resolved to `Triggered`; a closed gate skips the whole bucket
//!    without issuing a single command
//! 3. async (direct and triggered together), on the concurrent pool;
//!    triggered tasks in this bucket gate themselves, so the manager does
//!    not pre-check the signal for them
//!
//! Direct work must never starve behind a possibly-slow external signal,
//! which is why the gated sync bucket comes second. Results are folded
//! into a flat `tag -> value` report; failed tasks are logged and omitted
//! rather than poisoning the report.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::pool::{ConcurrentPool, SerialPool, TaskBatch, TaskResult};
use super::registry::{CollectMode, CollectType, TaskRegistry};
use super::task::CollectTask;
use super::trigger::{TriggerHandle, TriggerStatus};
use crate::executor::CommandRunner;

/// Aggregated collection output, keyed by task tag.
pub type Report = BTreeMap<String, serde_json::Value>;

pub struct TaskManager {
    modules: Vec<String>,
    registry: Arc<TaskRegistry>,
    runner: Arc<dyn CommandRunner>,
    gate: Option<TriggerHandle>,
    concurrent: ConcurrentPool,
}

impl TaskManager {
    pub fn new(
        modules: Vec<String>,
        registry: Arc<TaskRegistry>,
        runner: Arc<dyn CommandRunner>,
        gate: Option<TriggerHandle>,
        max_workers: usize,
    ) -> Self {
        Self {
            modules,
            registry,
            runner,
            gate,
            concurrent: ConcurrentPool::new(max_workers),
        }
    }

    /// Run every registered task of every configured module and fold the
    /// successful outcomes into one report.
    pub async fn run(&self) -> Report {
        let mut report = Report::new();
        for module in &self.modules {
            self.run_module(module, &mut report).await;
        }
        report
    }

    async fn run_module(&self, module: &str, report: &mut Report) {
        debug!("collecting module {module}");

        let direct = self
            .registry
            .tasks_for(module, CollectMode::Sync, CollectType::Direct);
        if !direct.is_empty() {
            let results = SerialPool::run_batch(self.batch_of(direct)).join().await;
            merge(report, results);
        }

        let gated = self
            .registry
            .tasks_for(module, CollectMode::Sync, CollectType::Triggered);
        if !gated.is_empty() {
            if self.wait_for_signal().await {
                let results = SerialPool::run_batch(self.batch_of(gated)).join().await;
                merge(report, results);
            } else {
                warn!(
                    "trigger gate did not open, skipping {} gated sync tasks of {module}",
                    gated.len()
                );
            }
        }

        let parallel = self.registry.async_tasks(module);
        if !parallel.is_empty() {
            let results = self.concurrent.run_batch(self.batch_of(parallel)).join().await;
            merge(report, results);
        }
    }

    fn batch_of(&self, tasks: Vec<Arc<CollectTask>>) -> TaskBatch {
        let mut batch = TaskBatch::new();
        for task in tasks {
            batch.add_task(task, Arc::clone(&self.runner), self.gate.clone());
        }
        batch
    }

    /// Block until the trigger gate resolves. `true` means the gated sync
    /// bucket may run; `false` (gate closed, or no gate wired at all) means
    /// skip it.
    async fn wait_for_signal(&self) -> bool {
        match &self.gate {
            Some(gate) => matches!(gate.wait(None).await, TriggerStatus::Triggered),
            None => false,
        }
    }
}

fn merge(report: &mut Report, results: Vec<TaskResult>) {
    for result in results {
        match result.outcome {
            Ok(value) => {
                report.insert(result.tag, value);
            }
            Err(e) => warn!("{} failed, omitting from report: {e}", result.name),
        }
    }
}
