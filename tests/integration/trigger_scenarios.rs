//! Integration tests for trigger gate behavior across the stack
//!
//! These tests verify:
//! - A real signal file on disk, read and consumed through the local runner
//! - Gate timeout closing within the expected window
//! - A closed gate skipping gated buckets and failing pressure-test cycles

use std::sync::Arc;
use std::time::{Duration, Instant};

use perf_harvest::collectors::MetricCollector;
use perf_harvest::config::{Config, TriggerConfig};
use perf_harvest::executor::{ExecuteResult, LocalRunner};
use perf_harvest::scheduler::{
    CollectType, TaskManager, TaskRegistry, TaskSpec, TriggerGate, TriggerStatus,
};
use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn test_signal_file_on_disk_triggers_and_is_consumed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trigger");

    let config = TriggerConfig {
        signal_path: path.display().to_string(),
        trigger_value: "1".into(),
        poll_interval_ms: 20,
        timeout_secs: 5,
    };

    let runner = Arc::new(LocalRunner::new(Duration::from_secs(5)));
    let gate = TriggerGate::new(config).spawn(runner);

    // nothing written yet, the poller keeps retrying
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(gate.status(), TriggerStatus::Waiting);

    std::fs::write(&path, "1\n").unwrap();

    let status = gate.wait(Some(Duration::from_secs(3))).await;
    assert_eq!(status, TriggerStatus::Triggered);

    // the signal file was consumed
    assert!(!path.exists());

    gate.stop().await;
}

#[tokio::test]
async fn test_gate_closes_within_a_second_and_bucket_is_skipped() {
    let scripted = ScriptedRunner::new().respond("gated-cmd", ExecuteResult::success("data"));
    let host = SignalHost::new(Arc::clone(&scripted), &fast_trigger(1));
    // never armed

    let gate = TriggerGate::new(fast_trigger(1)).spawn(host.clone());

    let started = Instant::now();
    let status = gate.wait(None).await;
    let elapsed = started.elapsed();

    assert_eq!(status, TriggerStatus::Close);
    assert!(elapsed >= Duration::from_millis(900), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(2500), "elapsed {elapsed:?}");

    let mut registry = TaskRegistry::new();
    registry
        .register_snapshot(
            TaskSpec::new("bench", "gated", "gated-cmd").kind(CollectType::Triggered),
            |_| Ok(json!(null)),
        )
        .unwrap();

    let manager = TaskManager::new(
        vec!["bench".into()],
        Arc::new(registry),
        host.clone(),
        Some(gate),
        4,
    );

    let report = manager.run().await;

    // the whole bucket was skipped, not a single command went out
    assert!(report.is_empty());
    assert_eq!(host.inner().call_count("gated-cmd"), 0);
}

#[tokio::test]
async fn test_pressure_test_cycle_fails_before_any_command_on_close() {
    let scripted = ScriptedRunner::new();
    let host = SignalHost::new(Arc::clone(&scripted), &fast_trigger(1));

    let gate = TriggerGate::new(fast_trigger(1)).spawn(host.clone());

    let config = Config {
        pressure_test_mode: true,
        trigger: fast_trigger(1),
        ..Config::default()
    };
    let collector = MetricCollector::new(config, host.clone(), Some(gate)).unwrap();

    let err = collector.run().await.unwrap_err();

    assert!(err.to_string().contains("trigger gate"));
    // no collection command was issued before the gate resolved
    assert!(host.inner().calls().is_empty());
}
