pub mod collectors;
pub mod config;
pub mod executor;
pub mod scheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::Report;

/// Output of one full collection cycle, with every sub-collector's report
/// merged under its fixed top-level key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostReport {
    pub timestamp: DateTime<Utc>,
    pub hostname: String,

    #[serde(rename = "Cpu")]
    pub cpu: Report,

    #[serde(rename = "Disk")]
    pub disk: Report,

    #[serde(rename = "Memory")]
    pub memory: Report,

    #[serde(rename = "Network")]
    pub network: Report,

    #[serde(rename = "Application")]
    pub application: Report,
}
