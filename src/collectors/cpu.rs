//! CPU collection tasks
//!
//! Static facts come from `lscpu`, the instantaneous load from
//! `/proc/loadavg`, and the busy percentage from two or more `/proc/stat`
//! snapshots taken over the sampling window.

use anyhow::{Context, bail};
use serde_json::{Value, json};

use crate::config::Config;
use crate::scheduler::{CollectMode, CollectType, TaskError, TaskRegistry, TaskSpec};

pub const MODULE: &str = "cpu";

pub fn register(registry: &mut TaskRegistry, config: &Config) -> Result<(), TaskError> {
    registry.register_snapshot(TaskSpec::new(MODULE, "cpu_info", "lscpu"), parse_lscpu)?;

    registry.register_snapshot(
        TaskSpec::new(MODULE, "load_avg", "cat /proc/loadavg").mode(CollectMode::Async),
        parse_loadavg,
    )?;

    registry.register_period(
        TaskSpec::new(MODULE, "cpu_usage", "cat /proc/stat")
            .mode(CollectMode::Async)
            .kind(CollectType::Triggered)
            .sampling(config.sampling_for("cpu.cpu_usage")),
        parse_cpu_usage,
    )?;

    Ok(())
}

fn parse_lscpu(raw: &str) -> anyhow::Result<Value> {
    let mut info = serde_json::Map::new();
    for line in raw.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let (key, value) = (key.trim(), value.trim());
            if !key.is_empty() && !value.is_empty() {
                info.insert(key.to_string(), json!(value));
            }
        }
    }

    if info.is_empty() {
        bail!("no key/value pairs in lscpu output");
    }
    Ok(Value::Object(info))
}

fn parse_loadavg(raw: &str) -> anyhow::Result<Value> {
    let mut parts = raw.split_whitespace();
    let mut next = || -> anyhow::Result<f64> {
        parts
            .next()
            .context("loadavg line too short")?
            .parse()
            .context("malformed load figure")
    };

    Ok(json!({
        "load1": next()?,
        "load5": next()?,
        "load15": next()?,
    }))
}

/// Busy percentage from the first and last successful `/proc/stat` sample.
fn parse_cpu_usage(samples: &[Option<String>]) -> anyhow::Result<Value> {
    let taken: Vec<&String> = samples.iter().flatten().collect();
    if taken.len() < 2 {
        bail!("need at least two samples to compute cpu usage");
    }

    let (first_total, first_idle) = aggregate_ticks(taken[0])?;
    let (last_total, last_idle) = aggregate_ticks(taken[taken.len() - 1])?;

    let delta_total = last_total.saturating_sub(first_total);
    let delta_idle = last_idle.saturating_sub(first_idle);
    if delta_total == 0 {
        bail!("cpu counters did not advance between samples");
    }

    let busy = 100.0 * delta_total.saturating_sub(delta_idle) as f64 / delta_total as f64;
    Ok(json!({ "busy_percent": (busy * 100.0).round() / 100.0 }))
}

/// `(total, idle)` tick counters of the aggregate `cpu ` line. Idle
/// includes iowait.
fn aggregate_ticks(raw: &str) -> anyhow::Result<(u64, u64)> {
    let line = raw
        .lines()
        .find(|line| line.starts_with("cpu "))
        .context("no aggregate cpu line in /proc/stat output")?;

    let ticks: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .context("malformed tick counter")?;

    if ticks.len() < 5 {
        bail!("aggregate cpu line too short");
    }
    Ok((ticks.iter().sum(), ticks[3] + ticks[4]))
}
