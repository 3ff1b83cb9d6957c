//! Disk collection tasks
//!
//! Capacity of the root filesystem from `df -P /` and I/O volume over the
//! sampling window from `/proc/diskstats` deltas.

use anyhow::{Context, bail};
use serde_json::{Value, json};

use crate::config::Config;
use crate::scheduler::{CollectMode, CollectType, TaskError, TaskRegistry, TaskSpec};

pub const MODULE: &str = "disk";

const KB_PER_GB: f64 = 1024.0 * 1024.0;

pub fn register(registry: &mut TaskRegistry, config: &Config) -> Result<(), TaskError> {
    registry.register_snapshot(TaskSpec::new(MODULE, "disk_free", "df -P /"), parse_df)?;

    registry.register_period(
        TaskSpec::new(MODULE, "disk_io", "cat /proc/diskstats")
            .mode(CollectMode::Async)
            .kind(CollectType::Triggered)
            .sampling(config.sampling_for("disk.disk_io")),
        parse_disk_io,
    )?;

    Ok(())
}

fn parse_df(raw: &str) -> anyhow::Result<Value> {
    // POSIX format: Filesystem 1024-blocks Used Available Capacity Mounted
    let line = raw.lines().nth(1).context("df output has no data row")?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 6 {
        bail!("df data row too short");
    }

    let kb = |field: &str| -> anyhow::Result<f64> {
        Ok(field.parse::<u64>().context("malformed block count")? as f64)
    };
    let round_gb = |value: f64| (value / KB_PER_GB * 100.0).round() / 100.0;

    Ok(json!({
        "total_gb": round_gb(kb(fields[1])?),
        "used_gb": round_gb(kb(fields[2])?),
        "available_gb": round_gb(kb(fields[3])?),
        "used_percent": fields[4]
            .trim_end_matches('%')
            .parse::<u64>()
            .context("malformed capacity percentage")?,
    }))
}

/// Sector deltas between the first and last successful `/proc/diskstats`
/// sample, summed over all physical-looking devices.
fn parse_disk_io(samples: &[Option<String>]) -> anyhow::Result<Value> {
    let taken: Vec<&String> = samples.iter().flatten().collect();
    if taken.len() < 2 {
        bail!("need at least two samples to compute disk io");
    }

    let first = sector_counters(taken[0])?;
    let last = sector_counters(taken[taken.len() - 1])?;

    Ok(json!({
        "sectors_read": last.0.saturating_sub(first.0),
        "sectors_written": last.1.saturating_sub(first.1),
    }))
}

fn sector_counters(raw: &str) -> anyhow::Result<(u64, u64)> {
    let mut read = 0u64;
    let mut written = 0u64;
    let mut seen = false;

    for line in raw.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let name = fields[2];
        if name.starts_with("loop") || name.starts_with("ram") {
            continue;
        }

        read += fields[5].parse::<u64>().context("malformed sector counter")?;
        written += fields[9].parse::<u64>().context("malformed sector counter")?;
        seen = true;
    }

    if !seen {
        bail!("no block devices in /proc/diskstats output");
    }
    Ok((read, written))
}
