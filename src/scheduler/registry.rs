//! Task registry - declarative classification of collection tasks
//!
//! Collection functions declare their execution policy with a `TaskSpec` and
//! are registered into an explicit `TaskRegistry` at startup. The registry
//! replaces the import-time decorator table of older collection agents: no
//! ambient global state, the registry is built once and shared behind an
//! `Arc` wherever lookups happen.
//!
//! Tasks are classified along two independent axes:
//!
//! - `CollectMode`: `Sync` runs on the serial pool, `Async` on the
//!   concurrent pool.
//! - `CollectType`: `Direct` runs immediately, `Triggered` first blocks on
//!   the trigger gate.
//!
//! Lookups are keyed by the collector module name, so "all async tasks of
//! the cpu module" is one call regardless of individual task names.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::error::TaskError;
use super::task::{CollectTask, Handler};

/// Upper bound (exclusive) for the sample count of a period task.
pub const MAX_SAMPLE_COUNT: usize = 100;

/// Upper bound (exclusive) for the inter-sample interval, in seconds.
pub const MAX_SAMPLE_INTERVAL: u64 = 300;

/// Which pool a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectMode {
    /// Serial pool, strictly sequential.
    Sync,

    /// Concurrent pool, bounded worker set.
    Async,
}

/// When a task is allowed to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectType {
    /// Runs immediately.
    Direct,

    /// Blocks on the trigger gate first.
    Triggered,
}

/// Sampling parameters of a period task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Sampling {
    /// How many samples to take. Must satisfy `0 < count < MAX_SAMPLE_COUNT`.
    #[serde(default = "default_sample_count")]
    pub count: usize,

    /// Seconds between consecutive samples. Must satisfy
    /// `0 < interval_secs < MAX_SAMPLE_INTERVAL`.
    #[serde(default = "default_sample_interval")]
    pub interval_secs: u64,

    /// Seconds to sleep before the first sample.
    #[serde(default)]
    pub delay_secs: u64,
}

fn default_sample_count() -> usize {
    5
}

fn default_sample_interval() -> u64 {
    1
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            count: default_sample_count(),
            interval_secs: default_sample_interval(),
            delay_secs: 0,
        }
    }
}

impl Sampling {
    /// Check the bounds; violations are configuration errors and surface
    /// before any remote command can be issued.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.count == 0 || self.count >= MAX_SAMPLE_COUNT {
            return Err(TaskError::InvalidSampling(format!(
                "sample count {} outside (0, {})",
                self.count, MAX_SAMPLE_COUNT
            )));
        }

        if self.interval_secs == 0 || self.interval_secs >= MAX_SAMPLE_INTERVAL {
            return Err(TaskError::InvalidSampling(format!(
                "sample interval {}s outside (0, {}s)",
                self.interval_secs, MAX_SAMPLE_INTERVAL
            )));
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Declarative description of one collection task.
///
/// Built with the fluent methods and handed to the registry together with
/// the parsing handler:
///
/// ```no_run
/// # use perf_harvest::scheduler::{TaskRegistry, TaskSpec, CollectMode, CollectType};
/// # fn example(registry: &mut TaskRegistry) -> Result<(), perf_harvest::scheduler::TaskError> {
/// registry.register_snapshot(
///     TaskSpec::new("cpu", "cpu_info", "lscpu")
///         .mode(CollectMode::Async)
///         .kind(CollectType::Direct),
///     |raw| Ok(serde_json::json!({ "lines": raw.lines().count() })),
/// )
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TaskSpec {
    module: String,
    tag: String,
    command: String,
    mode: CollectMode,
    kind: CollectType,
    sampling: Option<Sampling>,
}

impl TaskSpec {
    /// New spec with the defaults of the source system: sync + direct.
    pub fn new(
        module: impl Into<String>,
        tag: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            tag: tag.into(),
            command: command.into(),
            mode: CollectMode::Sync,
            kind: CollectType::Direct,
            sampling: None,
        }
    }

    pub fn mode(mut self, mode: CollectMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn kind(mut self, kind: CollectType) -> Self {
        self.kind = kind;
        self
    }

    /// Sampling parameters; only meaningful for period registrations.
    pub fn sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = Some(sampling);
        self
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        String,
        String,
        CollectMode,
        CollectType,
        Option<Sampling>,
    ) {
        (
            self.module,
            self.tag,
            self.command,
            self.mode,
            self.kind,
            self.sampling,
        )
    }
}

/// Registry of all collection tasks, keyed by collector module.
///
/// Built single-threaded at startup, then shared read-only behind an `Arc`.
/// Registrations are append-only and never mutated afterwards.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Vec<Arc<CollectTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a snapshot task: one command, one output, one parse.
    pub fn register_snapshot<F>(&mut self, spec: TaskSpec, handler: F) -> Result<(), TaskError>
    where
        F: Fn(&str) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.insert(spec, Handler::Snapshot(Box::new(handler)), None)
    }

    /// Register a period task: `count` samples at a fixed interval, parsed
    /// together. Sampling bounds are validated here - an out-of-range count
    /// or interval never reaches the runner.
    pub fn register_period<F>(&mut self, spec: TaskSpec, handler: F) -> Result<(), TaskError>
    where
        F: Fn(&[Option<String>]) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    {
        let sampling = spec.sampling.unwrap_or_default();
        sampling.validate()?;
        self.insert(spec, Handler::Period(Box::new(handler)), Some(sampling))
    }

    fn insert(
        &mut self,
        spec: TaskSpec,
        handler: Handler,
        sampling: Option<Sampling>,
    ) -> Result<(), TaskError> {
        let module_tasks = self.tasks.entry(spec.module.clone()).or_default();

        if module_tasks.iter().any(|task| task.tag() == spec.tag) {
            return Err(TaskError::DuplicateTag {
                module: spec.module,
                tag: spec.tag,
            });
        }

        let task = CollectTask::new(spec, handler, sampling);
        debug!(
            "registered task {} ({:?}/{:?})",
            task.name(),
            task.mode(),
            task.collect_type()
        );
        module_tasks.push(Arc::new(task));
        Ok(())
    }

    /// All tasks of `module` in one `(mode, kind)` bucket, registration order.
    pub fn tasks_for(
        &self,
        module: &str,
        mode: CollectMode,
        kind: CollectType,
    ) -> Vec<Arc<CollectTask>> {
        self.tasks
            .get(module)
            .map(|tasks| {
                tasks
                    .iter()
                    .filter(|task| task.mode() == mode && task.collect_type() == kind)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All async tasks of `module`, direct and triggered together - async
    /// tasks always share the concurrent pool and triggered ones gate
    /// themselves.
    pub fn async_tasks(&self, module: &str) -> Vec<Arc<CollectTask>> {
        self.tasks
            .get(module)
            .map(|tasks| {
                tasks
                    .iter()
                    .filter(|task| task.mode() == CollectMode::Async)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Registered module names, sorted for stable iteration.
    pub fn modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = self.tasks.keys().cloned().collect();
        modules.sort();
        modules
    }

    /// Total number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
