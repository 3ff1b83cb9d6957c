//! Network collection tasks
//!
//! Socket totals from `ss -s` and traffic volume over the sampling window
//! from `/proc/net/dev` deltas, loopback excluded.

use anyhow::{Context, bail};
use serde_json::{Value, json};

use crate::config::Config;
use crate::scheduler::{CollectMode, CollectType, TaskError, TaskRegistry, TaskSpec};

pub const MODULE: &str = "network";

pub fn register(registry: &mut TaskRegistry, config: &Config) -> Result<(), TaskError> {
    registry.register_snapshot(
        TaskSpec::new(MODULE, "tcp_connections", "ss -s").mode(CollectMode::Async),
        parse_socket_summary,
    )?;

    registry.register_period(
        TaskSpec::new(MODULE, "net_throughput", "cat /proc/net/dev")
            .mode(CollectMode::Async)
            .kind(CollectType::Triggered)
            .sampling(config.sampling_for("network.net_throughput")),
        parse_throughput,
    )?;

    Ok(())
}

fn parse_socket_summary(raw: &str) -> anyhow::Result<Value> {
    // "TCP:   12 (estab 5, closed 2, orphaned 0, timewait 2)"
    let line = raw
        .lines()
        .find(|line| line.trim_start().starts_with("TCP:"))
        .context("no TCP line in ss output")?;

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 || fields[2] != "(estab" {
        bail!("unexpected TCP line layout");
    }

    Ok(json!({
        "tcp_total": fields[1].parse::<u64>().context("malformed socket count")?,
        "tcp_established": fields[3]
            .trim_end_matches(',')
            .parse::<u64>()
            .context("malformed socket count")?,
    }))
}

/// Byte deltas between the first and last successful `/proc/net/dev`
/// sample, summed over every interface except loopback.
fn parse_throughput(samples: &[Option<String>]) -> anyhow::Result<Value> {
    let taken: Vec<&String> = samples.iter().flatten().collect();
    if taken.len() < 2 {
        bail!("need at least two samples to compute throughput");
    }

    let first = byte_counters(taken[0])?;
    let last = byte_counters(taken[taken.len() - 1])?;

    Ok(json!({
        "rx_bytes": last.0.saturating_sub(first.0),
        "tx_bytes": last.1.saturating_sub(first.1),
    }))
}

fn byte_counters(raw: &str) -> anyhow::Result<(u64, u64)> {
    let mut rx = 0u64;
    let mut tx = 0u64;
    let mut seen = false;

    for line in raw.lines() {
        let Some((iface, counters)) = line.split_once(':') else {
            continue;
        };
        if iface.trim() == "lo" {
            continue;
        }

        let fields: Vec<&str> = counters.split_whitespace().collect();
        if fields.len() < 9 {
            continue;
        }

        rx += fields[0].parse::<u64>().context("malformed byte counter")?;
        tx += fields[8].parse::<u64>().context("malformed byte counter")?;
        seen = true;
    }

    if !seen {
        bail!("no interfaces in /proc/net/dev output");
    }
    Ok((rx, tx))
}
