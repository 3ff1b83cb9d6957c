use std::collections::HashMap;
use std::time::Duration;

use tracing::trace;

use crate::scheduler::Sampling;

/// Trigger gate configuration
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TriggerConfig {
    /// Path of the signal file on the target host
    #[serde(default = "default_signal_path")]
    pub signal_path: String,

    /// File content (after trimming) that counts as the trigger signal
    #[serde(default = "default_trigger_value")]
    pub trigger_value: String,

    /// How often the poller re-reads the signal file
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long the gate waits for the signal before closing
    #[serde(default = "default_trigger_timeout")]
    pub timeout_secs: u64,
}

impl TriggerConfig {
    /// Poll cadence; a zero config value is lifted to 1 ms because
    /// `tokio::time::interval` rejects a zero period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            signal_path: default_signal_path(),
            trigger_value: default_trigger_value(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_trigger_timeout(),
        }
    }
}

fn default_signal_path() -> String {
    String::from("/tmp/harvest.trigger")
}

fn default_trigger_value() -> String {
    String::from("1")
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_trigger_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Application whose dedicated collector should run (e.g. "nginx")
    pub application: Option<String>,

    /// Block the whole collection cycle on the trigger gate before any
    /// command is issued
    #[serde(default)]
    pub pressure_test_mode: bool,

    #[serde(default)]
    pub trigger: TriggerConfig,

    /// Worker bound of the concurrent pool
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Per-command timeout of the local runner, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Sampling parameters applied to period tasks without an override
    #[serde(default)]
    pub sampling: Sampling,

    /// Per-task sampling overrides keyed by qualified task name
    /// (`module.tag`, e.g. `"cpu.cpu_usage"`)
    #[serde(default)]
    pub sampling_overrides: HashMap<String, Sampling>,
}

impl Config {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Sampling parameters for a period task, override first.
    pub fn sampling_for(&self, name: &str) -> Sampling {
        self.sampling_overrides
            .get(name)
            .copied()
            .unwrap_or(self.sampling)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            application: None,
            pressure_test_mode: false,
            trigger: TriggerConfig::default(),
            max_workers: default_max_workers(),
            command_timeout_secs: default_command_timeout(),
            sampling: Sampling::default(),
            sampling_overrides: HashMap::new(),
        }
    }
}

fn default_max_workers() -> usize {
    8
}

fn default_command_timeout() -> u64 {
    60
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
