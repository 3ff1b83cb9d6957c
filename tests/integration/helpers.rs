//! Helper runners and fixtures for integration tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use perf_harvest::config::TriggerConfig;
use perf_harvest::executor::{CommandRunner, ExecuteResult};

/// Replays canned responses per command and records every call in order.
///
/// A command can carry a sequence of responses; once the sequence is down
/// to its last entry, that entry is repeated for further calls.
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, VecDeque<ExecuteResult>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn respond(self: Arc<Self>, command: &str, result: ExecuteResult) -> Arc<Self> {
        self.respond_seq(command, vec![result])
    }

    pub fn respond_seq(self: Arc<Self>, command: &str, results: Vec<ExecuteResult>) -> Arc<Self> {
        self.responses
            .lock()
            .unwrap()
            .insert(command.to_string(), results.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == command)
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run_cmd(&self, command: &str) -> ExecuteResult {
        self.calls.lock().unwrap().push(command.to_string());

        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| ExecuteResult::failure(127, "sequence exhausted")),
            None => ExecuteResult::failure(127, format!("not scripted: {command}")),
        }
    }

    async fn run_background_cmd(&self, command: &str) -> ExecuteResult {
        self.calls.lock().unwrap().push(format!("(bg) {command}"));
        ExecuteResult::success("4242")
    }
}

/// Emulates the signal file of a remote host: `cat` on the signal path
/// sees the armed value, `rm` consumes it, everything else is delegated
/// to an inner scripted runner.
pub struct SignalHost {
    inner: Arc<ScriptedRunner>,
    path: String,
    value: String,
    armed: AtomicBool,
    deletes: AtomicUsize,
}

impl SignalHost {
    pub fn new(inner: Arc<ScriptedRunner>, config: &TriggerConfig) -> Arc<Self> {
        Arc::new(Self {
            inner,
            path: config.signal_path.clone(),
            value: config.trigger_value.clone(),
            armed: AtomicBool::new(false),
            deletes: AtomicUsize::new(0),
        })
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &ScriptedRunner {
        &self.inner
    }
}

#[async_trait]
impl CommandRunner for SignalHost {
    async fn run_cmd(&self, command: &str) -> ExecuteResult {
        if command == format!("cat {}", self.path) {
            return if self.armed.load(Ordering::SeqCst) {
                ExecuteResult::success(format!("{}\n", self.value))
            } else {
                ExecuteResult::failure(1, format!("cat: {}: No such file or directory", self.path))
            };
        }

        if command == format!("rm -f {}", self.path) {
            self.armed.store(false, Ordering::SeqCst);
            self.deletes.fetch_add(1, Ordering::SeqCst);
            return ExecuteResult::success("");
        }

        self.inner.run_cmd(command).await
    }

    async fn run_background_cmd(&self, command: &str) -> ExecuteResult {
        self.inner.run_background_cmd(command).await
    }
}

/// Trigger configuration with a fast poll so gate tests finish quickly.
pub fn fast_trigger(timeout_secs: u64) -> TriggerConfig {
    TriggerConfig {
        signal_path: "/tmp/harvest-test.trigger".into(),
        trigger_value: "1".into(),
        poll_interval_ms: 20,
        timeout_secs,
    }
}
