//! Metric collection facade
//!
//! Four fixed sub-collectors (cpu, disk, memory, network) plus an optional
//! application-specific one, each backed by its own task manager over a
//! shared registry. `MetricCollector::run` produces one `HostReport` with
//! the sub-reports merged under fixed top-level keys.
//!
//! In pressure-test mode the whole cycle blocks on the trigger gate before
//! the first command is issued; a gate that closes instead of triggering
//! fails the cycle hard. This is deliberately stricter than the per-bucket
//! skip inside the task manager: a desynchronized pressure test would
//! produce numbers that look valid but measured nothing.

pub mod application;
pub mod cpu;
pub mod disk;
pub mod memory;
pub mod network;

use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::HostReport;
use crate::config::Config;
use crate::executor::CommandRunner;
use crate::scheduler::{Report, TaskManager, TaskRegistry, TriggerHandle, TriggerStatus};

pub struct MetricCollector {
    config: Config,
    registry: Arc<TaskRegistry>,
    runner: Arc<dyn CommandRunner>,
    gate: Option<TriggerHandle>,
}

impl std::fmt::Debug for MetricCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricCollector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MetricCollector {
    /// Build the collector and register every task set. Fails on invalid
    /// sampling configuration, so bad parameters surface at startup rather
    /// than mid-cycle.
    pub fn new(
        config: Config,
        runner: Arc<dyn CommandRunner>,
        gate: Option<TriggerHandle>,
    ) -> anyhow::Result<Self> {
        let mut registry = TaskRegistry::new();
        cpu::register(&mut registry, &config)?;
        disk::register(&mut registry, &config)?;
        memory::register(&mut registry, &config)?;
        network::register(&mut registry, &config)?;

        if let Some(name) = &config.application {
            if application::register(&mut registry, name)? {
                info!("registered dedicated collector for application {name}");
            } else {
                debug!("no dedicated collector for application {name}");
            }
        }

        Ok(Self {
            config,
            registry: Arc::new(registry),
            runner,
            gate,
        })
    }

    /// Run one full collection cycle.
    pub async fn run(&self) -> anyhow::Result<HostReport> {
        if self.config.pressure_test_mode {
            self.await_pressure_gate().await?;
        }

        let cpu = self.collect_module(cpu::MODULE).await;
        let disk = self.collect_module(disk::MODULE).await;
        let memory = self.collect_module(memory::MODULE).await;
        let network = self.collect_module(network::MODULE).await;
        let application = match &self.config.application {
            Some(name) => self.collect_module(name).await,
            None => Report::new(),
        };

        Ok(HostReport {
            timestamp: Utc::now(),
            hostname: self.hostname().await,
            cpu,
            disk,
            memory,
            network,
            application,
        })
    }

    async fn await_pressure_gate(&self) -> anyhow::Result<()> {
        let Some(gate) = &self.gate else {
            bail!("pressure test mode requires a trigger gate");
        };

        info!("pressure test mode, waiting for the trigger signal");
        match gate.wait(None).await {
            TriggerStatus::Triggered => Ok(()),
            status => bail!("trigger gate resolved {status:?} while waiting for the load signal"),
        }
    }

    async fn collect_module(&self, module: &str) -> Report {
        TaskManager::new(
            vec![module.to_string()],
            Arc::clone(&self.registry),
            Arc::clone(&self.runner),
            self.gate.clone(),
            self.config.max_workers,
        )
        .run()
        .await
    }

    async fn hostname(&self) -> String {
        let result = self.runner.run_cmd("hostname").await;
        if result.is_success() {
            result.output.trim().to_string()
        } else {
            warn!("could not resolve hostname: {}", result.err_msg);
            String::from("unknown")
        }
    }
}
