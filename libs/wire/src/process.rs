//! Process lifecycle vocabulary shared by the supervisor and the dispatcher.

use gitfleet_id::DroneId;
use serde::{Deserialize, Serialize};

/// Supervisor state of a tracked process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// The OS process is alive.
    Running,

    /// Exited and waiting out the respawn backoff.
    Respawning,

    /// Explicitly stopped; the entry is removed immediately after.
    Stopped,

    /// Hit the error limit; reaped after the grace window, never respawned.
    Error,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Respawning => write!(f, "respawning"),
            ProcessStatus::Stopped => write!(f, "stopped"),
            ProcessStatus::Error => write!(f, "error"),
        }
    }
}

/// Inspection snapshot of one tracked process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub status: ProcessStatus,
    pub repo: String,
    pub commit: String,
    pub command: Vec<String>,
}

/// How a subprocess (git or a workload) terminated abnormally.
///
/// `code` and `signal` mirror the OS exit status; `message` carries an
/// OS-level launch error when the subprocess never ran at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubprocessFailure {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl std::fmt::Display for SubprocessFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(msg) = &self.message {
            return write!(f, "{msg}");
        }
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exited with code {code}"),
            (None, Some(sig)) => write!(f, "killed by signal {sig}"),
            (None, None) => write!(f, "exited abnormally"),
        }
    }
}

/// Phase of a deploy dispatch that failed on one drone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    Fetch,
    Deploy,
}

impl std::fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeployPhase::Fetch => write!(f, "fetch"),
            DeployPhase::Deploy => write!(f, "deploy"),
        }
    }
}

/// One per-drone failure record collected by a deploy dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployFailure {
    pub phase: DeployPhase,
    pub drone: DroneId,
    pub code: Option<i32>,
    pub signal: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
