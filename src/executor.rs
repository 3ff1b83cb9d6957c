//! Command execution seam
//!
//! This module defines the `CommandRunner` trait that the scheduler core
//! consumes, plus the `ExecuteResult` envelope every command returns.
//!
//! ## Design Principles
//!
//! 1. **Errors are data** - A failed command is a non-zero `status_code`, not
//!    an `Err`. Pools and managers branch on the envelope, nothing throws.
//! 2. **Transport-agnostic** - The core treats localhost and SSH targets
//!    uniformly; only `LocalRunner` lives here, remote runners are external
//!    collaborators implementing the same trait.
//! 3. **Bounded** - Every foreground command is capped by a timeout so a hung
//!    tool cannot stall a collection cycle indefinitely.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{trace, warn};

/// Default cap for a single foreground command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Status code reported when the failure happened on our side of the fork
/// (spawn error, timeout, killed by signal) rather than inside the tool.
pub const LOCAL_FAILURE_CODE: i32 = -1;

/// Uniform result envelope for every remote command and every task.
///
/// Invariant: `status_code == 0` iff the operation succeeded, and `output`
/// is only meaningful when it did. Built fresh per invocation and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteResult {
    /// Exit status of the command; `0` means success.
    pub status_code: i32,

    /// Captured stdout (trailing newline trimmed). Empty on failure.
    pub output: String,

    /// Human-readable failure description (stderr or transport error).
    pub err_msg: String,
}

impl ExecuteResult {
    /// Successful envelope carrying the command's stdout.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status_code: 0,
            output: output.into(),
            err_msg: String::new(),
        }
    }

    /// Failed envelope; `status_code` must be non-zero.
    pub fn failure(status_code: i32, err_msg: impl Into<String>) -> Self {
        Self {
            status_code,
            output: String::new(),
            err_msg: err_msg.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 0
    }
}

/// Trait for command execution backends
///
/// All runners (local subprocess, SSH session, test doubles) implement this
/// trait. The scheduler core never shells out directly.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; a single runner is shared across
/// every task of a collection cycle.
///
/// ## Error Handling
///
/// Methods never fail at the Rust level: transport problems (unreachable
/// host, spawn failure, timeout) come back as an `ExecuteResult` with a
/// non-zero `status_code`. Retry/backoff, where wanted, belongs inside the
/// implementation - callers issue each command exactly once.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    async fn run_cmd(&self, command: &str) -> ExecuteResult;

    /// Start a command detached from the current cycle.
    ///
    /// On success the envelope's `output` holds the spawned pid as a decimal
    /// string. The child is not waited on and survives the cycle.
    async fn run_background_cmd(&self, command: &str) -> ExecuteResult;
}

/// Subprocess-backed runner for the local host.
///
/// Commands run under `sh -c`, so the usual pipe/redirect syntax of the
/// collection command strings works unchanged.
#[derive(Debug, Clone)]
pub struct LocalRunner {
    timeout: Duration,
}

impl LocalRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run_cmd(&self, command: &str) -> ExecuteResult {
        trace!("running command: {command}");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("failed to spawn `{command}`: {e}");
                return ExecuteResult::failure(LOCAL_FAILURE_CODE, format!("spawn failed: {e}"));
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("failed to collect output of `{command}`: {e}");
                return ExecuteResult::failure(LOCAL_FAILURE_CODE, format!("wait failed: {e}"));
            }
            Err(_) => {
                warn!(
                    "command `{command}` exceeded timeout of {}s",
                    self.timeout.as_secs()
                );
                return ExecuteResult::failure(
                    LOCAL_FAILURE_CODE,
                    format!("timed out after {}s", self.timeout.as_secs()),
                );
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout)
            .trim_end_matches('\n')
            .to_string();

        if output.status.success() {
            ExecuteResult::success(stdout)
        } else {
            let code = output.status.code().unwrap_or(LOCAL_FAILURE_CODE);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            trace!("command `{command}` exited with {code}: {stderr}");
            ExecuteResult::failure(code, stderr)
        }
    }

    async fn run_background_cmd(&self, command: &str) -> ExecuteResult {
        trace!("spawning background command: {command}");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match child {
            Ok(child) => match child.id() {
                Some(pid) => ExecuteResult::success(pid.to_string()),
                // The child already exited; there is no pid to report.
                None => ExecuteResult::failure(
                    LOCAL_FAILURE_CODE,
                    "background command exited before a pid could be read",
                ),
            },
            Err(e) => {
                warn!("failed to spawn background `{command}`: {e}");
                ExecuteResult::failure(LOCAL_FAILURE_CODE, format!("spawn failed: {e}"))
            }
        }
    }
}
