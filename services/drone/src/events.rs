//! Typed observability events emitted by the drone.
//!
//! Every interesting transition (spawn, exit, output, stop, deploy, link
//! state) is published on an mpsc channel and consumed by a logging observer
//! task, decoupling the supervisor and agent from presentation.

use gitfleet_id::ProcessId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Events published by the supervisor, pipeline, and agent.
#[derive(Debug, Clone)]
pub enum DroneEvent {
    /// Connected and registered with the hub.
    LinkUp { hub: String },

    /// Lost (or failed to establish) the hub link.
    LinkDown { reason: String },

    /// A workload process was launched.
    Spawn {
        pid: ProcessId,
        repo: String,
        commit: String,
        command: Vec<String>,
        cwd: String,
    },

    /// A workload process exited.
    Exit {
        pid: ProcessId,
        repo: String,
        commit: String,
        command: Vec<String>,
        code: Option<i32>,
        signal: Option<i32>,
    },

    /// A workload failed to launch at the OS level.
    LaunchFailed {
        pid: ProcessId,
        repo: String,
        commit: String,
        error: String,
    },

    /// A line of workload stdout.
    Stdout {
        pid: ProcessId,
        repo: String,
        commit: String,
        line: String,
    },

    /// A line of workload stderr.
    Stderr {
        pid: ProcessId,
        repo: String,
        commit: String,
        line: String,
    },

    /// A process was explicitly stopped.
    Stop { pid: ProcessId },

    /// A deploy completed on this drone.
    Deploy {
        repo: String,
        commit: String,
        cwd: String,
    },
}

/// Spawn the observer task that turns events into structured logs.
pub fn spawn_observer(mut rx: mpsc::Receiver<DroneEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            log_event(event);
        }
    })
}

fn log_event(event: DroneEvent) {
    match event {
        DroneEvent::LinkUp { hub } => {
            info!(hub = %hub, "connected to the hub");
        }
        DroneEvent::LinkDown { reason } => {
            warn!(reason = %reason, "disconnected from the hub");
        }
        DroneEvent::Spawn {
            pid,
            repo,
            commit,
            command,
            cwd,
        } => {
            info!(
                pid = %pid,
                repo = %repo,
                commit = %commit,
                command = %command.join(" "),
                cwd = %cwd,
                "spawned workload"
            );
        }
        DroneEvent::Exit {
            pid,
            repo,
            commit,
            command,
            code,
            signal,
        } => {
            info!(
                pid = %pid,
                repo = %repo,
                commit = %commit,
                command = %command.join(" "),
                code = ?code,
                signal = ?signal,
                "workload exited"
            );
        }
        DroneEvent::LaunchFailed {
            pid,
            repo,
            commit,
            error,
        } => {
            warn!(
                pid = %pid,
                repo = %repo,
                commit = %commit,
                error = %error,
                "workload failed to launch"
            );
        }
        DroneEvent::Stdout {
            pid, repo, commit, line,
        } => {
            info!(target: "workload", pid = %pid, repo = %repo, commit = %commit, "{line}");
        }
        DroneEvent::Stderr {
            pid, repo, commit, line,
        } => {
            warn!(target: "workload", pid = %pid, repo = %repo, commit = %commit, "{line}");
        }
        DroneEvent::Stop { pid } => {
            info!(pid = %pid, "stopped workload");
        }
        DroneEvent::Deploy { repo, commit, cwd } => {
            info!(repo = %repo, commit = %commit, cwd = %cwd, "deploy complete");
        }
    }
}
