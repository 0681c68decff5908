//! Per-call request bodies shared by the dispatcher and the drone agent.

use std::collections::BTreeMap;

use gitfleet_id::ProcessId;
use serde::{Deserialize, Serialize};

/// A deploy: update the mirror, clone it, and check out a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Repository name (no `.git` suffix).
    pub repo: String,

    /// Commit hash to check out.
    pub commit: String,
}

/// A spawn: run a workload out of a deployed working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Repository name.
    pub repo: String,

    /// Commit hash the workload belongs to.
    pub commit: String,

    /// Workload argv; the first element is the program.
    pub command: Vec<String>,

    /// Number of independent processes to spawn on each selected drone.
    #[serde(default = "default_count")]
    pub count: u32,

    /// Per-drone cap on non-error processes for this commit. At or over the
    /// cap the spawn refuses silently (empty result, not an error).
    #[serde(default)]
    pub limit: Option<u32>,

    /// Respawn-count threshold for entering the error state.
    #[serde(default)]
    pub errlimit: Option<u32>,

    /// Caller-supplied environment, merged over the injected variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory override; defaults to the deploy tree for
    /// `repo.commit`.
    #[serde(default)]
    pub cwd: Option<String>,

    /// One-shot: do not respawn after exit, remove the entry instead.
    #[serde(default)]
    pub once: bool,
}

fn default_count() -> u32 {
    1
}

/// Which processes a stop call targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopTarget {
    /// An explicit list of process ids. Unknown ids are a no-op.
    Pids { pids: Vec<ProcessId> },

    /// Every tracked process.
    All,

    /// Every tracked process whose commit starts with the given prefix.
    Commit { prefix: String },
}
