//! Process supervisor - owns the drone's process table.
//!
//! The table is single-owner state behind an mpsc mailbox: every mutation
//! happens on the supervisor task, and concurrent callers (link command
//! handlers, exit waiters, timers) only ever message it. This removes the
//! need for locks at the cost of staleness windows; notably the spawn `limit`
//! check observes the table as of message processing and is deliberately not
//! transactional across a fleet dispatch.
//!
//! ## Lifecycle
//!
//! ```text
//! running --(exit, not stopped)--> respawning --(1s backoff)--> running
//! running | respawning --(explicit stop)--> stopped (entry removed)
//! running --(exit, errlimit hit within 30s)--> error --(10s grace)--> removed
//! running --(exit, once)--> removed
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use gitfleet_id::{DroneId, ProcessId};
use gitfleet_wire::{ProcessInfo, ProcessStatus, SpawnRequest, StopTarget};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::events::DroneEvent;

// =============================================================================
// Timings
// =============================================================================

/// Supervisor timer durations.
///
/// The defaults are the protocol's fixed values; tests shrink them.
#[derive(Debug, Clone)]
pub struct SupervisorTimings {
    /// Delay between an unplanned exit and the relaunch.
    pub respawn_backoff: Duration,

    /// Window after the initial spawn within which respawns count against
    /// the error limit.
    pub error_window: Duration,

    /// How long an error-state entry stays visible before it is reaped.
    pub error_grace: Duration,
}

impl Default for SupervisorTimings {
    fn default() -> Self {
        Self {
            respawn_backoff: Duration::from_secs(1),
            error_window: Duration::from_secs(30),
            error_grace: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by supervisor operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// The referenced process id is not tracked.
    #[error("no such process")]
    NotFound,

    /// The supervisor task is gone.
    #[error("supervisor unavailable")]
    Closed,
}

// =============================================================================
// Messages
// =============================================================================

/// Mailbox messages. The public operations carry reply oneshots; the
/// remaining variants are internal notifications from waiter and timer tasks.
#[derive(Debug)]
pub enum SupervisorMessage {
    Spawn {
        request: SpawnRequest,
        reply: oneshot::Sender<Vec<ProcessId>>,
    },
    Stop {
        target: StopTarget,
        reply: oneshot::Sender<Vec<ProcessId>>,
    },
    Restart {
        pid: ProcessId,
        reply: oneshot::Sender<Result<(), SupervisorError>>,
    },
    Ps {
        reply: oneshot::Sender<BTreeMap<ProcessId, ProcessInfo>>,
    },

    /// An OS process exited (sent by its waiter task).
    Exited {
        pid: ProcessId,
        epoch: u64,
        code: Option<i32>,
        signal: Option<i32>,
    },

    /// The respawn backoff for a process elapsed.
    RespawnDue { pid: ProcessId, epoch: u64 },

    /// The error grace window for a process elapsed.
    Reap { pid: ProcessId, epoch: u64 },
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for issuing operations to the supervisor task.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorMessage>,
}

impl SupervisorHandle {
    /// Spawn workloads; returns the ids actually started.
    pub async fn spawn(&self, request: SpawnRequest) -> Result<Vec<ProcessId>, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SupervisorMessage::Spawn { request, reply })
            .await
            .map_err(|_| SupervisorError::Closed)?;
        rx.await.map_err(|_| SupervisorError::Closed)
    }

    /// Stop tracked processes; returns the ids actually stopped.
    pub async fn stop(&self, target: StopTarget) -> Result<Vec<ProcessId>, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SupervisorMessage::Stop { target, reply })
            .await
            .map_err(|_| SupervisorError::Closed)?;
        rx.await.map_err(|_| SupervisorError::Closed)
    }

    /// Restart one process.
    pub async fn restart(&self, pid: ProcessId) -> Result<(), SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SupervisorMessage::Restart { pid, reply })
            .await
            .map_err(|_| SupervisorError::Closed)?;
        rx.await.map_err(|_| SupervisorError::Closed)?
    }

    /// Snapshot the process table.
    pub async fn ps(&self) -> Result<BTreeMap<ProcessId, ProcessInfo>, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SupervisorMessage::Ps { reply })
            .await
            .map_err(|_| SupervisorError::Closed)?;
        rx.await.map_err(|_| SupervisorError::Closed)
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// One tracked workload.
struct Supervised {
    status: ProcessStatus,
    repo: String,
    commit: String,
    command: Vec<String>,
    cwd: PathBuf,
    env: BTreeMap<String, String>,
    once: bool,
    errlimit: Option<u32>,
    /// Set once at the initial spawn; the error window is anchored here.
    spawned_at: Instant,
    respawns: u32,
    /// Incremented per launch; stale exit/timer notifications from an
    /// earlier launch of the same id are discarded by comparing epochs.
    epoch: u64,
    /// Fires the kill path of the current launch's waiter task.
    kill: Option<oneshot::Sender<()>>,
}

/// The supervisor task state. Create with [`Supervisor::new`], then drive it
/// with [`Supervisor::run`] on its own task.
pub struct Supervisor {
    drone_id: DroneId,
    deploy_dir: PathBuf,
    timings: SupervisorTimings,
    table: BTreeMap<ProcessId, Supervised>,
    events: mpsc::Sender<DroneEvent>,
    self_tx: mpsc::Sender<SupervisorMessage>,
    rx: mpsc::Receiver<SupervisorMessage>,
}

impl Supervisor {
    /// Create a supervisor and its handle.
    pub fn new(
        drone_id: DroneId,
        deploy_dir: PathBuf,
        events: mpsc::Sender<DroneEvent>,
        timings: SupervisorTimings,
    ) -> (Self, SupervisorHandle) {
        let (tx, rx) = mpsc::channel(64);
        let supervisor = Self {
            drone_id,
            deploy_dir,
            timings,
            table: BTreeMap::new(),
            events,
            self_tx: tx.clone(),
            rx,
        };
        (supervisor, SupervisorHandle { tx })
    }

    /// Run the mailbox loop until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            self.handle(msg).await;
        }
        debug!("supervisor mailbox closed");
    }

    async fn handle(&mut self, msg: SupervisorMessage) {
        match msg {
            SupervisorMessage::Spawn { request, reply } => {
                let pids = self.handle_spawn(request).await;
                let _ = reply.send(pids);
            }
            SupervisorMessage::Stop { target, reply } => {
                let pids = self.handle_stop(target).await;
                let _ = reply.send(pids);
            }
            SupervisorMessage::Restart { pid, reply } => {
                let result = self.handle_restart(pid).await;
                let _ = reply.send(result);
            }
            SupervisorMessage::Ps { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SupervisorMessage::Exited {
                pid,
                epoch,
                code,
                signal,
            } => {
                self.handle_exited(pid, epoch, code, signal);
            }
            SupervisorMessage::RespawnDue { pid, epoch } => {
                self.handle_respawn_due(pid, epoch).await;
            }
            SupervisorMessage::Reap { pid, epoch } => {
                self.handle_reap(pid, epoch);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Spawn
    // -------------------------------------------------------------------------

    async fn handle_spawn(&mut self, request: SpawnRequest) -> Vec<ProcessId> {
        let count = request.count.max(1);
        let mut pids = Vec::new();
        for _ in 0..count {
            if let Some(pid) = self.spawn_one(&request).await {
                pids.push(pid);
            }
        }
        pids
    }

    async fn spawn_one(&mut self, request: &SpawnRequest) -> Option<ProcessId> {
        if request.command.is_empty() {
            warn!(repo = %request.repo, commit = %request.commit, "spawn with empty command");
            return None;
        }

        // Capacity refusal: silent, not an error. Counts the table as of this
        // message; racing dispatches can both pass (documented behavior).
        if let Some(limit) = request.limit {
            let running = self
                .table
                .values()
                .filter(|p| p.commit == request.commit && p.status != ProcessStatus::Error)
                .count() as u32;
            if running >= limit {
                debug!(
                    commit = %request.commit,
                    running,
                    limit,
                    "spawn refused: commit at capacity"
                );
                return None;
            }
        }

        let pid = ProcessId::random();

        let cwd = request
            .cwd
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                self.deploy_dir
                    .join(format!("{}.{}", request.repo, request.commit))
            });

        let mut env = BTreeMap::new();
        env.insert("REPO".to_string(), request.repo.clone());
        env.insert("COMMIT".to_string(), request.commit.clone());
        env.insert("PROCESS_ID".to_string(), pid.to_string());
        env.insert("DRONE_ID".to_string(), self.drone_id.to_string());
        // Caller-supplied variables win over the injected ones
        env.extend(request.env.clone());

        let mut entry = Supervised {
            status: ProcessStatus::Running,
            repo: request.repo.clone(),
            commit: request.commit.clone(),
            command: request.command.clone(),
            cwd,
            env,
            once: request.once,
            errlimit: request.errlimit,
            spawned_at: Instant::now(),
            respawns: 0,
            epoch: 0,
            kill: None,
        };

        match self.launch(pid, &mut entry) {
            Ok(()) => {
                self.emit(DroneEvent::Spawn {
                    pid,
                    repo: entry.repo.clone(),
                    commit: entry.commit.clone(),
                    command: entry.command.clone(),
                    cwd: entry.cwd.display().to_string(),
                })
                .await;
                self.table.insert(pid, entry);
                Some(pid)
            }
            Err(e) => {
                self.emit(DroneEvent::LaunchFailed {
                    pid,
                    repo: entry.repo.clone(),
                    commit: entry.commit.clone(),
                    error: e.to_string(),
                })
                .await;
                None
            }
        }
    }

    /// Launch the OS process for an entry and wire up its waiter task.
    ///
    /// The waiter owns the child: it emits the exit event and notifies the
    /// mailbox, and it performs the kill when the entry's kill sender fires.
    fn launch(&self, pid: ProcessId, entry: &mut Supervised) -> std::io::Result<()> {
        let mut cmd = Command::new(&entry.command[0]);
        cmd.args(&entry.command[1..])
            .current_dir(&entry.cwd)
            .envs(entry.env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        entry.epoch += 1;
        let epoch = entry.epoch;

        if let Some(stdout) = child.stdout.take() {
            let events = self.events.clone();
            let (repo, commit) = (entry.repo.clone(), entry.commit.clone());
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = events
                        .send(DroneEvent::Stdout {
                            pid,
                            repo: repo.clone(),
                            commit: commit.clone(),
                            line,
                        })
                        .await;
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let events = self.events.clone();
            let (repo, commit) = (entry.repo.clone(), entry.commit.clone());
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = events
                        .send(DroneEvent::Stderr {
                            pid,
                            repo: repo.clone(),
                            commit: commit.clone(),
                            line,
                        })
                        .await;
                }
            });
        }

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        entry.kill = Some(kill_tx);

        let events = self.events.clone();
        let mailbox = self.self_tx.clone();
        let repo = entry.repo.clone();
        let commit = entry.commit.clone();
        let command = entry.command.clone();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                result = kill_rx => {
                    if result.is_ok() {
                        let _ = child.start_kill();
                    }
                    child.wait().await
                }
            };

            let (code, signal) = match status {
                Ok(status) => (status.code(), exit_signal(&status)),
                Err(_) => (None, None),
            };

            let _ = events
                .send(DroneEvent::Exit {
                    pid,
                    repo,
                    commit,
                    command,
                    code,
                    signal,
                })
                .await;
            let _ = mailbox
                .send(SupervisorMessage::Exited {
                    pid,
                    epoch,
                    code,
                    signal,
                })
                .await;
        });

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Exit, respawn, reap
    // -------------------------------------------------------------------------

    fn handle_exited(
        &mut self,
        pid: ProcessId,
        epoch: u64,
        _code: Option<i32>,
        _signal: Option<i32>,
    ) {
        let Some(entry) = self.table.get_mut(&pid) else {
            // Stop raced the exit; the entry is already gone.
            return;
        };
        if entry.epoch != epoch {
            return;
        }
        entry.kill = None;

        if entry.once {
            self.table.remove(&pid);
            return;
        }
        if entry.status == ProcessStatus::Stopped {
            self.table.remove(&pid);
            return;
        }

        if let Some(errlimit) = entry.errlimit {
            if entry.spawned_at.elapsed() <= self.timings.error_window
                && entry.respawns >= errlimit
            {
                entry.status = ProcessStatus::Error;
                warn!(
                    pid = %pid,
                    commit = %entry.commit,
                    respawns = entry.respawns,
                    errlimit,
                    "error limit hit, scheduling reap"
                );
                self.schedule(
                    self.timings.error_grace,
                    SupervisorMessage::Reap { pid, epoch },
                );
                return;
            }
        }

        entry.status = ProcessStatus::Respawning;
        entry.respawns += 1;
        self.schedule(
            self.timings.respawn_backoff,
            SupervisorMessage::RespawnDue { pid, epoch },
        );
    }

    async fn handle_respawn_due(&mut self, pid: ProcessId, epoch: u64) {
        let Some(entry) = self.table.get(&pid) else {
            // Stopped (and removed) during the backoff.
            return;
        };
        if entry.epoch != epoch || entry.status != ProcessStatus::Respawning {
            return;
        }
        self.relaunch(pid).await;
    }

    /// Relaunch a tracked entry with identical id, repo, commit, cwd,
    /// command, and env.
    async fn relaunch(&mut self, pid: ProcessId) {
        let Some(mut entry) = self.table.remove(&pid) else {
            return;
        };
        match self.launch(pid, &mut entry) {
            Ok(()) => {
                entry.status = ProcessStatus::Running;
                self.emit(DroneEvent::Spawn {
                    pid,
                    repo: entry.repo.clone(),
                    commit: entry.commit.clone(),
                    command: entry.command.clone(),
                    cwd: entry.cwd.display().to_string(),
                })
                .await;
                self.table.insert(pid, entry);
            }
            Err(e) => {
                // Entry stays removed; relaunch failures are terminal.
                self.emit(DroneEvent::LaunchFailed {
                    pid,
                    repo: entry.repo.clone(),
                    commit: entry.commit.clone(),
                    error: e.to_string(),
                })
                .await;
            }
        }
    }

    fn handle_reap(&mut self, pid: ProcessId, epoch: u64) {
        if let Some(entry) = self.table.get(&pid) {
            if entry.epoch == epoch && entry.status == ProcessStatus::Error {
                self.table.remove(&pid);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Stop, restart, inspect
    // -------------------------------------------------------------------------

    async fn handle_stop(&mut self, target: StopTarget) -> Vec<ProcessId> {
        let pids: Vec<ProcessId> = match &target {
            StopTarget::Pids { pids } => pids.clone(),
            StopTarget::All => self.table.keys().copied().collect(),
            StopTarget::Commit { prefix } => self
                .table
                .iter()
                .filter(|(_, p)| p.commit.starts_with(prefix.as_str()))
                .map(|(pid, _)| *pid)
                .collect(),
        };

        let mut stopped = Vec::new();
        for pid in pids {
            // Unknown ids are a no-op, not an error
            let Some(mut entry) = self.table.remove(&pid) else {
                continue;
            };
            entry.status = ProcessStatus::Stopped;
            if let Some(kill) = entry.kill.take() {
                let _ = kill.send(());
            }
            self.emit(DroneEvent::Stop { pid }).await;
            stopped.push(pid);
        }
        stopped
    }

    async fn handle_restart(&mut self, pid: ProcessId) -> Result<(), SupervisorError> {
        let Some(entry) = self.table.get_mut(&pid) else {
            return Err(SupervisorError::NotFound);
        };
        if entry.status == ProcessStatus::Stopped {
            self.relaunch(pid).await;
        } else if let Some(kill) = entry.kill.take() {
            // Terminate; the normal exit path respawns it.
            let _ = kill.send(());
        }
        Ok(())
    }

    fn snapshot(&self) -> BTreeMap<ProcessId, ProcessInfo> {
        self.table
            .iter()
            .map(|(pid, p)| {
                (
                    *pid,
                    ProcessInfo {
                        status: p.status,
                        repo: p.repo.clone(),
                        commit: p.commit.clone(),
                        command: p.command.clone(),
                    },
                )
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn schedule(&self, delay: Duration, msg: SupervisorMessage) {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(msg).await;
        });
    }

    async fn emit(&self, event: DroneEvent) {
        let _ = self.events.send(event).await;
    }
}

/// Signal number a subprocess was killed by, if any.
#[cfg(unix)]
pub(crate) fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
pub(crate) fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
