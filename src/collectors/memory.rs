//! Memory collection tasks
//!
//! Both tasks read `free -m`: a one-shot breakdown of the current state,
//! and a gated series that averages usage while load is applied.

use anyhow::{Context, bail};
use serde_json::{Value, json};

use crate::config::Config;
use crate::scheduler::{CollectType, TaskError, TaskRegistry, TaskSpec};

pub const MODULE: &str = "memory";

pub fn register(registry: &mut TaskRegistry, config: &Config) -> Result<(), TaskError> {
    registry.register_snapshot(TaskSpec::new(MODULE, "mem_info", "free -m"), parse_free)?;

    registry.register_period(
        TaskSpec::new(MODULE, "mem_used", "free -m")
            .kind(CollectType::Triggered)
            .sampling(config.sampling_for("memory.mem_used")),
        parse_used_series,
    )?;

    Ok(())
}

fn parse_free(raw: &str) -> anyhow::Result<Value> {
    let row = mem_row(raw)?;

    let mut value = json!({
        "total_mb": row[0],
        "used_mb": row[1],
        "free_mb": row[2],
    });
    // `available` is the last column of procps free, older variants lack it
    if let Some(available) = row.get(5) {
        value["available_mb"] = json!(available);
    }
    Ok(value)
}

/// Average used memory across the successful samples of the series.
fn parse_used_series(samples: &[Option<String>]) -> anyhow::Result<Value> {
    let mut used = Vec::new();
    for sample in samples.iter().flatten() {
        used.push(mem_row(sample)?[1] as f64);
    }

    if used.is_empty() {
        bail!("no usable samples in series");
    }

    let avg = used.iter().sum::<f64>() / used.len() as f64;
    Ok(json!({
        "avg_used_mb": (avg * 100.0).round() / 100.0,
        "samples": used.len(),
    }))
}

/// Numeric columns of the `Mem:` row.
fn mem_row(raw: &str) -> anyhow::Result<Vec<u64>> {
    let line = raw
        .lines()
        .find(|line| line.starts_with("Mem:"))
        .context("no Mem row in free output")?;

    let row: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .context("malformed memory figure")?;

    if row.len() < 3 {
        bail!("Mem row too short");
    }
    Ok(row)
}
