//! Error types for collection tasks

use std::fmt;

use crate::executor::ExecuteResult;

/// Outcome of one task execution: the parsed value, or a structured failure.
///
/// This is the tagged-union boundary of the scheduler - pools and managers
/// branch on the variant instead of catching anything.
pub type TaskOutcome = Result<serde_json::Value, TaskError>;

/// Errors that can occur while registering or running a collection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Sampling parameters outside the allowed bounds
    InvalidSampling(String),

    /// A second task tried to claim a tag already registered in the module
    DuplicateTag { module: String, tag: String },

    /// The remote command failed; carries the executor's envelope untouched
    Command { status_code: i32, err_msg: String },

    /// The parsing handler rejected the command output
    Parse(String),

    /// The trigger gate closed before the signal arrived
    TriggerClosed,

    /// Every sample of a period task failed
    NoSamples,

    /// The task was still outstanding when its batch hit the deadline
    Timeout,

    /// The task panicked; isolated by the pool
    Panicked(String),
}

impl TaskError {
    /// Wrap a failed executor envelope without altering it.
    pub fn from_failure(result: &ExecuteResult) -> Self {
        TaskError::Command {
            status_code: result.status_code,
            err_msg: result.err_msg.clone(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::InvalidSampling(msg) => write!(f, "invalid sampling parameters: {}", msg),
            TaskError::DuplicateTag { module, tag } => {
                write!(f, "tag '{}' already registered in module '{}'", tag, module)
            }
            TaskError::Command {
                status_code,
                err_msg,
            } => write!(f, "command failed with status {}: {}", status_code, err_msg),
            TaskError::Parse(msg) => write!(f, "failed to parse command output: {}", msg),
            TaskError::TriggerClosed => write!(f, "trigger gate closed before the signal arrived"),
            TaskError::NoSamples => write!(f, "no samples were collected"),
            TaskError::Timeout => write!(f, "task did not finish before the batch deadline"),
            TaskError::Panicked(msg) => write!(f, "task panicked: {}", msg),
        }
    }
}

impl std::error::Error for TaskError {}
