//! Collection task execution
//!
//! A `CollectTask` binds one shell command to one parsing handler. Two
//! shapes exist:
//!
//! - snapshot: run the command once, hand stdout to the handler.
//! - period: run the command `count` times with a fixed interval in
//!   between, hand the whole sample series to the handler.
//!
//! Command failures and parse failures never escape as panics or bare
//! errors: `run` always resolves to a `TaskOutcome`, so a pool can report
//! every submitted task exactly once regardless of what went wrong inside.

use tracing::{debug, warn};

use super::error::{TaskError, TaskOutcome};
use super::registry::{CollectMode, CollectType, Sampling, TaskSpec};
use super::trigger::{TriggerHandle, TriggerStatus};
use crate::executor::CommandRunner;

pub(crate) type SnapshotHandler =
    dyn Fn(&str) -> anyhow::Result<serde_json::Value> + Send + Sync;
pub(crate) type PeriodHandler =
    dyn Fn(&[Option<String>]) -> anyhow::Result<serde_json::Value> + Send + Sync;

/// The parsing half of a task. Snapshot handlers see raw stdout, period
/// handlers see one entry per sample with failed samples as `None`.
pub(crate) enum Handler {
    Snapshot(Box<SnapshotHandler>),
    Period(Box<PeriodHandler>),
}

/// One registered collection task. Immutable after registration and shared
/// behind an `Arc` between the registry and running batches.
pub struct CollectTask {
    name: String,
    tag: String,
    command: String,
    mode: CollectMode,
    kind: CollectType,
    sampling: Option<Sampling>,
    handler: Handler,
}

impl CollectTask {
    pub(crate) fn new(spec: TaskSpec, handler: Handler, sampling: Option<Sampling>) -> Self {
        let (module, tag, command, mode, kind, _) = spec.into_parts();
        Self {
            name: format!("{module}.{tag}"),
            tag,
            command,
            mode,
            kind,
            sampling,
            handler,
        }
    }

    /// Qualified name, `module.tag`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key under which the parsed value lands in the module report.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn mode(&self) -> CollectMode {
        self.mode
    }

    pub fn collect_type(&self) -> CollectType {
        self.kind
    }

    pub fn sampling(&self) -> Option<Sampling> {
        self.sampling
    }

    /// Execute the task against `runner`.
    ///
    /// Triggered tasks block on the gate first and resolve to
    /// `TaskError::TriggerClosed` without issuing a single command when the
    /// gate closes. Period tasks sleep their configured delay before
    /// consulting the gate, mirroring the order in which the parameters are
    /// documented to apply.
    pub async fn run(
        &self,
        runner: &dyn CommandRunner,
        gate: Option<&TriggerHandle>,
    ) -> TaskOutcome {
        match &self.handler {
            Handler::Snapshot(parse) => {
                self.await_gate(gate).await?;
                self.run_snapshot(runner, parse).await
            }
            Handler::Period(parse) => {
                let sampling = self.sampling.unwrap_or_default();
                if !sampling.delay().is_zero() {
                    debug!("{} sleeping {:?} before first sample", self.name, sampling.delay());
                    tokio::time::sleep(sampling.delay()).await;
                }
                self.await_gate(gate).await?;
                self.run_period(runner, parse, sampling).await
            }
        }
    }

    async fn await_gate(&self, gate: Option<&TriggerHandle>) -> Result<(), TaskError> {
        if self.kind != CollectType::Triggered {
            return Ok(());
        }

        let Some(gate) = gate else {
            warn!("{} is triggered but no trigger gate is wired, skipping", self.name);
            return Err(TaskError::TriggerClosed);
        };

        debug!("{} waiting on trigger gate", self.name);
        match gate.wait(None).await {
            TriggerStatus::Triggered => Ok(()),
            status => {
                warn!("trigger gate resolved {status:?}, skipping {}", self.name);
                Err(TaskError::TriggerClosed)
            }
        }
    }

    async fn run_snapshot(
        &self,
        runner: &dyn CommandRunner,
        parse: &SnapshotHandler,
    ) -> TaskOutcome {
        let result = runner.run_cmd(&self.command).await;
        if !result.is_success() {
            warn!(
                "{} command failed with status {}: {}",
                self.name, result.status_code, result.err_msg
            );
            return Err(TaskError::from_failure(&result));
        }

        match parse(&result.output) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("{} failed to parse command output: {e:#}", self.name);
                Err(TaskError::Parse(format!("{e:#}")))
            }
        }
    }

    async fn run_period(
        &self,
        runner: &dyn CommandRunner,
        parse: &PeriodHandler,
        sampling: Sampling,
    ) -> TaskOutcome {
        let mut samples: Vec<Option<String>> = Vec::with_capacity(sampling.count);

        for n in 0..sampling.count {
            // Sleep between consecutive samples, not before the first or
            // after the last.
            if n > 0 {
                tokio::time::sleep(sampling.interval()).await;
            }

            let result = runner.run_cmd(&self.command).await;
            if result.is_success() {
                samples.push(Some(result.output));
            } else {
                warn!(
                    "{} sample {}/{} failed with status {}: {}",
                    self.name,
                    n + 1,
                    sampling.count,
                    result.status_code,
                    result.err_msg
                );
                samples.push(None);
            }
        }

        if samples.iter().all(Option::is_none) {
            warn!("{} produced no successful samples", self.name);
            return Err(TaskError::NoSamples);
        }

        match parse(&samples) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("{} failed to parse sample series: {e:#}", self.name);
                Err(TaskError::Parse(format!("{e:#}")))
            }
        }
    }
}

impl std::fmt::Debug for CollectTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectTask")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("mode", &self.mode)
            .field("kind", &self.kind)
            .field("sampling", &self.sampling)
            .finish_non_exhaustive()
    }
}
