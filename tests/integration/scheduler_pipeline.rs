//! Integration tests for the full collection pipeline
//!
//! These tests verify that the pieces work correctly together:
//! - Registry → Manager → Pools → Runner
//! - Gated series tasks running a real sampling window
//! - Report aggregation in the face of failing siblings

use std::sync::Arc;
use std::time::{Duration, Instant};

use perf_harvest::collectors::MetricCollector;
use perf_harvest::config::Config;
use perf_harvest::executor::ExecuteResult;
use perf_harvest::scheduler::{
    CollectMode, Report, Sampling, TaskManager, TaskRegistry, TaskSpec, TriggerGate,
};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::helpers::*;

fn two_point_series() -> Config {
    Config {
        sampling: Sampling {
            count: 2,
            interval_secs: 1,
            delay_secs: 0,
        },
        trigger: fast_trigger(5),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_full_cycle_with_armed_gate_runs_gated_series() {
    let scripted = ScriptedRunner::new()
        .respond("lscpu", ExecuteResult::success("Architecture: x86_64\nCPU(s): 8\n"))
        .respond("cat /proc/loadavg", ExecuteResult::success("0.45 0.62 0.38 1/234 5678\n"))
        .respond_seq(
            "cat /proc/stat",
            vec![
                ExecuteResult::success("cpu 100 0 100 700 100 0 0 0 0 0\n"),
                ExecuteResult::success("cpu 400 0 300 1100 200 0 0 0 0 0\n"),
            ],
        )
        .respond(
            "df -P /",
            ExecuteResult::success(
                "Filesystem 1024-blocks Used Available Capacity Mounted on\n/dev/sda1 498443264 102931456 370126208 22% /\n",
            ),
        )
        .respond_seq(
            "cat /proc/diskstats",
            vec![
                ExecuteResult::success(" 259 0 sda 0 0 100 0 0 0 200 0 0 0 0\n"),
                ExecuteResult::success(" 259 0 sda 0 0 400 0 0 0 900 0 0 0 0\n"),
            ],
        )
        .respond(
            "free -m",
            ExecuteResult::success("Mem: 15876 4521 8234 312 3120 10789\n"),
        )
        .respond(
            "ss -s",
            ExecuteResult::success("TCP:   12 (estab 5, closed 2, orphaned 0, timewait 2)\n"),
        )
        .respond_seq(
            "cat /proc/net/dev",
            vec![
                ExecuteResult::success("  eth0: 1000 1 0 0 0 0 0 0 2000 1 0 0 0 0 0 0\n"),
                ExecuteResult::success("  eth0: 5000 1 0 0 0 0 0 0 9000 1 0 0 0 0 0 0\n"),
            ],
        )
        .respond("hostname", ExecuteResult::success("loadbox\n"));

    let config = two_point_series();
    let host = SignalHost::new(Arc::clone(&scripted), &config.trigger);
    host.arm();

    let gate = TriggerGate::new(config.trigger.clone()).spawn(host.clone());
    let collector = MetricCollector::new(config, host.clone(), Some(gate.clone())).unwrap();

    let report = collector.run().await.unwrap();
    gate.stop().await;

    assert_eq!(report.hostname, "loadbox");
    assert_eq!(report.cpu["cpu_usage"], json!({ "busy_percent": 50.0 }));
    assert_eq!(
        report.memory["mem_used"],
        json!({ "avg_used_mb": 4521.0, "samples": 2 })
    );
    assert_eq!(
        report.disk["disk_io"],
        json!({ "sectors_read": 300, "sectors_written": 700 })
    );
    assert_eq!(
        report.network["net_throughput"],
        json!({ "rx_bytes": 4000, "tx_bytes": 7000 })
    );

    // every series made exactly its sample count of calls
    assert_eq!(host.inner().call_count("cat /proc/stat"), 2);
    assert_eq!(host.inner().call_count("cat /proc/diskstats"), 2);
    // one for mem_info, two for the mem_used series
    assert_eq!(host.inner().call_count("free -m"), 3);

    // the signal was consumed exactly once
    assert_eq!(host.deletes(), 1);
}

#[tokio::test]
async fn test_report_omits_failing_sibling_and_keeps_the_rest() {
    let runner = ScriptedRunner::new()
        .respond("collect-disk", ExecuteResult::success("120"))
        .respond("collect-mem", ExecuteResult::failure(1, "out of memory"));

    let mut registry = TaskRegistry::new();
    registry
        .register_snapshot(TaskSpec::new("system", "disk", "collect-disk"), |_| {
            Ok(json!({ "free_gb": 120 }))
        })
        .unwrap();
    registry
        .register_snapshot(
            TaskSpec::new("system", "mem", "collect-mem").mode(CollectMode::Async),
            |_| Ok(json!({ "never": "reached" })),
        )
        .unwrap();

    let manager = TaskManager::new(
        vec!["system".into()],
        Arc::new(registry),
        runner.clone(),
        None,
        4,
    );

    let report = manager.run().await;

    let expected: Report = [("disk".to_string(), json!({ "free_gb": 120 }))]
        .into_iter()
        .collect();
    assert_eq!(report, expected);
}

#[tokio::test]
async fn test_period_task_issues_exact_sample_count() {
    let runner = ScriptedRunner::new().respond("pulse", ExecuteResult::success("tick"));

    let mut registry = TaskRegistry::new();
    registry
        .register_period(
            TaskSpec::new("bench", "ticks", "pulse").sampling(Sampling {
                count: 3,
                interval_secs: 1,
                delay_secs: 0,
            }),
            |samples| Ok(json!(samples.iter().flatten().count())),
        )
        .unwrap();

    let manager = TaskManager::new(
        vec!["bench".into()],
        Arc::new(registry),
        runner.clone(),
        None,
        4,
    );

    let started = Instant::now();
    let report = manager.run().await;
    let elapsed = started.elapsed();

    assert_eq!(report["ticks"], json!(3));
    assert_eq!(runner.call_count("pulse"), 3);

    // two sleeps between three samples, none before the first or after the
    // last
    assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
}
