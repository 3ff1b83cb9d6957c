//! Integration tests for failure handling and error isolation
//!
//! These tests verify:
//! - Unparseable command output spoils only its own task
//! - Runner timeouts surface as command failures with the local code
//! - Invalid sampling configuration is rejected before any command runs
//! - A panicking handler cannot take sibling tasks down

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use perf_harvest::collectors::MetricCollector;
use perf_harvest::config::Config;
use perf_harvest::executor::{ExecuteResult, LOCAL_FAILURE_CODE, LocalRunner};
use perf_harvest::scheduler::{
    CollectMode, CollectType, Sampling, SerialPool, TaskBatch, TaskError, TaskManager,
    TaskRegistry, TaskSpec,
};
use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn test_unparseable_output_spoils_only_its_own_task() {
    let runner = ScriptedRunner::new()
        .respond("lscpu", ExecuteResult::success("no separators whatsoever"))
        .respond(
            "cat /proc/loadavg",
            ExecuteResult::success("0.45 0.62 0.38 1/234 5678\n"),
        )
        .respond("hostname", ExecuteResult::success("box\n"));

    let collector = MetricCollector::new(Config::default(), runner, None).unwrap();

    let report = collector.run().await.unwrap();

    assert!(!report.cpu.contains_key("cpu_info"));
    assert_eq!(
        report.cpu["load_avg"],
        json!({ "load1": 0.45, "load5": 0.62, "load15": 0.38 })
    );
}

#[tokio::test]
async fn test_runner_timeout_surfaces_as_command_failure() {
    let runner = Arc::new(LocalRunner::new(Duration::from_millis(100)));

    let mut registry = TaskRegistry::new();
    registry
        .register_snapshot(TaskSpec::new("bench", "slow", "sleep 5; echo done"), |_| {
            Ok(json!("unreachable"))
        })
        .unwrap();

    let mut batch = TaskBatch::new();
    for task in registry.tasks_for("bench", CollectMode::Sync, CollectType::Direct) {
        batch.add_task(task, runner.clone(), None);
    }

    let results = SerialPool::run_batch(batch).join().await;

    assert_eq!(results.len(), 1);
    match &results[0].outcome {
        Err(TaskError::Command { status_code, .. }) => {
            assert_eq!(*status_code, LOCAL_FAILURE_CODE);
        }
        other => panic!("expected a command failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_sampling_override_is_rejected_at_startup() {
    let config = Config {
        sampling_overrides: HashMap::from([(
            "cpu.cpu_usage".to_string(),
            Sampling {
                count: 0,
                interval_secs: 1,
                delay_secs: 0,
            },
        )]),
        ..Config::default()
    };

    let runner = ScriptedRunner::new();
    let err = MetricCollector::new(config, runner.clone(), None).unwrap_err();

    assert!(err.to_string().contains("sample count"));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_panicking_handler_cannot_take_siblings_down() {
    let runner = ScriptedRunner::new()
        .respond("good-cmd", ExecuteResult::success("fine"))
        .respond("bad-cmd", ExecuteResult::success("boom"));

    let mut registry = TaskRegistry::new();
    registry
        .register_snapshot(TaskSpec::new("mix", "good", "good-cmd"), |raw| {
            Ok(json!(raw))
        })
        .unwrap();
    registry
        .register_snapshot(TaskSpec::new("mix", "bad", "bad-cmd"), |_| {
            panic!("handler bug")
        })
        .unwrap();

    let manager = TaskManager::new(vec!["mix".into()], Arc::new(registry), runner, None, 4);

    let report = manager.run().await;

    assert_eq!(report.len(), 1);
    assert_eq!(report["good"], json!("fine"));
}
