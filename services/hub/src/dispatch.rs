//! Fleet-wide command dispatch: selector resolution, parallel fan-out, and
//! result fan-in.
//!
//! Every operation resolves its selector once, issues one call per selected
//! drone on its own task, and joins the lot. Zero selected drones completes
//! immediately with the neutral result. Calls that time out or lose their
//! link count as failures; they can delay the barrier by at most the call
//! deadline, never indefinitely.

use std::collections::BTreeMap;
use std::time::Duration;

use gitfleet_id::{DroneId, ProcessId};
use gitfleet_wire::{
    CommandReply, DeployFailure, DeployPhase, DeployRequest, DroneCommand, PsEvent, Selector,
    SpawnRequest, StopTarget, SubprocessFailure,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::registry::{CallError, DroneLink};
use crate::state::AppState;

/// Deploy `repo` at `commit` on the selected drones: fetch first, then
/// deploy only where the fetch succeeded. Returns the collected failures;
/// empty means a clean fleet-wide deploy.
pub async fn deploy(
    state: &AppState,
    selector: &Selector,
    repo: &str,
    commit: &str,
) -> Vec<DeployFailure> {
    let drones = state.registry().select(selector);
    let timeout = state.config().call_timeout;

    let mut set = JoinSet::new();
    for drone in drones {
        let repo = repo.to_string();
        let commit = commit.to_string();
        set.spawn(async move { deploy_one(drone, repo, commit, timeout).await });
    }

    let mut failures = Vec::new();
    while let Some(joined) = set.join_next().await {
        if let Ok(Some(failure)) = joined {
            failures.push(failure);
        }
    }
    failures
}

async fn deploy_one(
    drone: DroneLink,
    repo: String,
    commit: String,
    timeout: Duration,
) -> Option<DeployFailure> {
    match drone.call(DroneCommand::Fetch { repo: repo.clone() }, timeout).await {
        Ok(CommandReply::Fetch { error: None }) => {}
        Ok(CommandReply::Fetch { error: Some(f) }) => {
            return Some(subprocess_failure(DeployPhase::Fetch, drone.id, f));
        }
        Ok(other) => return Some(mismatched_reply(DeployPhase::Fetch, drone.id, &other)),
        Err(e) => return Some(call_failure(DeployPhase::Fetch, drone.id, e)),
    }

    match drone
        .call(DroneCommand::Deploy(DeployRequest { repo, commit }), timeout)
        .await
    {
        Ok(CommandReply::Deploy { error: None }) => None,
        Ok(CommandReply::Deploy { error: Some(f) }) => {
            Some(subprocess_failure(DeployPhase::Deploy, drone.id, f))
        }
        Ok(other) => Some(mismatched_reply(DeployPhase::Deploy, drone.id, &other)),
        Err(e) => Some(call_failure(DeployPhase::Deploy, drone.id, e)),
    }
}

/// Spawn workloads on the selected drones, returning the spawned pids per
/// drone. Drones whose call fails contribute no entry.
pub async fn spawn(
    state: &AppState,
    selector: &Selector,
    request: &SpawnRequest,
) -> BTreeMap<DroneId, Vec<ProcessId>> {
    let drones = state.registry().select(selector);
    let timeout = state.config().call_timeout;

    let mut set = JoinSet::new();
    for drone in drones {
        let mut request = request.clone();
        // Expose the drone's identity to the workload unless the caller
        // pinned their own value
        request
            .env
            .entry("DRONE_ID".to_string())
            .or_insert_with(|| drone.id.to_string());
        set.spawn(async move {
            let id = drone.id;
            (id, drone.call(DroneCommand::Spawn(request), timeout).await)
        });
    }

    collect_pid_map(set, "spawn").await
}

/// Stop workloads on the selected drones, returning the stopped pids per
/// drone.
pub async fn stop(
    state: &AppState,
    selector: &Selector,
    target: &StopTarget,
) -> BTreeMap<DroneId, Vec<ProcessId>> {
    let drones = state.registry().select(selector);
    let timeout = state.config().call_timeout;

    let mut set = JoinSet::new();
    for drone in drones {
        let target = target.clone();
        set.spawn(async move {
            let id = drone.id;
            (id, drone.call(DroneCommand::Stop { target }, timeout).await)
        });
    }

    collect_pid_map(set, "stop").await
}

async fn collect_pid_map(
    mut set: JoinSet<(DroneId, Result<CommandReply, CallError>)>,
    op: &'static str,
) -> BTreeMap<DroneId, Vec<ProcessId>> {
    let mut procs = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        let Ok((id, result)) = joined else {
            continue;
        };
        match result {
            Ok(CommandReply::Spawn { pids }) | Ok(CommandReply::Stop { pids }) => {
                procs.insert(id, pids);
            }
            Ok(other) => {
                warn!(drone_id = %id, op, reply = ?other, "mismatched reply");
            }
            Err(e) => {
                warn!(drone_id = %id, op, error = %e, "drone call failed");
            }
        }
    }
    procs
}

/// Streaming process listing across the selected drones.
///
/// The returned channel yields one `addr` event per drone eagerly, one
/// `data` event per drone as it answers (failed drones yield none), and a
/// single terminal `end`.
pub fn ps(state: &AppState, selector: &Selector) -> mpsc::Receiver<PsEvent> {
    let drones = state.registry().select(selector);
    let timeout = state.config().call_timeout;
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut set = JoinSet::new();
        for drone in drones {
            let _ = tx
                .send(PsEvent::Addr {
                    drone: drone.id,
                    addr: drone.addr.clone(),
                })
                .await;
            set.spawn(async move {
                let id = drone.id;
                (id, drone.call(DroneCommand::Ps, timeout).await)
            });
        }

        while let Some(joined) = set.join_next().await {
            let Ok((id, result)) = joined else {
                continue;
            };
            match result {
                Ok(CommandReply::Ps { procs }) => {
                    let _ = tx.send(PsEvent::Data { drone: id, procs }).await;
                }
                Ok(other) => {
                    warn!(drone_id = %id, reply = ?other, "mismatched ps reply");
                }
                Err(e) => {
                    debug!(drone_id = %id, error = %e, "ps call failed");
                }
            }
        }

        let _ = tx.send(PsEvent::End).await;
    });

    rx
}

/// Broadcast a mirror fetch for `repo` to every registered drone,
/// best-effort. Used by the push hook to keep mirrors warm ahead of demand.
pub async fn broadcast_fetch(state: &AppState, repo: &str) {
    let drones = state.registry().list();
    let timeout = state.config().call_timeout;

    let mut set = JoinSet::new();
    for drone in drones {
        let repo = repo.to_string();
        set.spawn(async move {
            let id = drone.id;
            (id, drone.call(DroneCommand::Fetch { repo }, timeout).await)
        });
    }

    while let Some(joined) = set.join_next().await {
        let Ok((id, result)) = joined else {
            continue;
        };
        match result {
            Ok(CommandReply::Fetch { error: None }) => {}
            Ok(CommandReply::Fetch { error: Some(e) }) => {
                warn!(drone_id = %id, repo, error = %e, "push fetch failed");
            }
            Ok(other) => {
                warn!(drone_id = %id, repo, reply = ?other, "mismatched fetch reply");
            }
            Err(e) => {
                warn!(drone_id = %id, repo, error = %e, "push fetch failed");
            }
        }
    }
}

fn subprocess_failure(phase: DeployPhase, drone: DroneId, f: SubprocessFailure) -> DeployFailure {
    DeployFailure {
        phase,
        drone,
        code: f.code,
        signal: f.signal,
        message: f.message,
    }
}

fn call_failure(phase: DeployPhase, drone: DroneId, error: CallError) -> DeployFailure {
    DeployFailure {
        phase,
        drone,
        code: None,
        signal: None,
        message: Some(error.to_string()),
    }
}

fn mismatched_reply(phase: DeployPhase, drone: DroneId, reply: &CommandReply) -> DeployFailure {
    DeployFailure {
        phase,
        drone,
        code: None,
        signal: None,
        message: Some(format!("mismatched reply: {reply:?}")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use gitfleet_wire::{ProcessInfo, ProcessStatus};
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::Config;
    use crate::registry::OutboundCall;

    fn test_state() -> AppState {
        AppState::new(Config {
            listen: "127.0.0.1:0".parse().unwrap(),
            secret: "s3cret".to_string(),
            basedir: std::env::temp_dir(),
            git_url: "http://127.0.0.1:7001".to_string(),
            call_timeout: Duration::from_millis(200),
        })
    }

    /// Register a fake drone whose link answers every command through `f`.
    fn fake_drone<F>(state: &AppState, id: &str, mut f: F) -> DroneId
    where
        F: FnMut(DroneCommand) -> Option<CommandReply> + Send + 'static,
    {
        let id: DroneId = id.parse().unwrap();
        let (tx, mut rx) = mpsc::channel::<OutboundCall>(8);
        state.registry().register(id, "127.0.0.1:9999".to_string(), tx);
        tokio::spawn(async move {
            while let Some(call) = rx.recv().await {
                match f(call.command) {
                    Some(reply) => {
                        let _ = call.reply.send(reply);
                    }
                    None => drop(call.reply),
                }
            }
        });
        id
    }

    fn procs_fixture() -> BTreeMap<gitfleet_id::ProcessId, ProcessInfo> {
        let mut procs = BTreeMap::new();
        procs.insert(
            "b2e4d1".parse().unwrap(),
            ProcessInfo {
                status: ProcessStatus::Running,
                repo: "webapp".to_string(),
                commit: "c1".to_string(),
                command: vec!["node".to_string(), "server.js".to_string()],
            },
        );
        procs
    }

    #[tokio::test]
    async fn test_deploy_with_empty_selection_is_immediate_success() {
        let state = test_state();
        let failures = deploy(&state, &Selector::All, "webapp", "c1").await;
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn test_deploy_skips_deploy_after_failed_fetch() {
        let state = test_state();
        fake_drone(&state, "3fa91c07", |command| match command {
            DroneCommand::Fetch { .. } => Some(CommandReply::Fetch {
                error: Some(SubprocessFailure {
                    code: Some(128),
                    signal: None,
                    message: Some("no such repo".to_string()),
                }),
            }),
            DroneCommand::Deploy(_) => panic!("deploy issued after failed fetch"),
            _ => None,
        });

        let failures = deploy(&state, &Selector::All, "webapp", "c1").await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].phase, DeployPhase::Fetch);
        assert_eq!(failures[0].code, Some(128));
    }

    #[tokio::test]
    async fn test_deploy_collects_failures_per_drone() {
        let state = test_state();
        let good = fake_drone(&state, "3fa91c07", |command| match command {
            DroneCommand::Fetch { .. } => Some(CommandReply::Fetch { error: None }),
            DroneCommand::Deploy(_) => Some(CommandReply::Deploy { error: None }),
            _ => None,
        });
        let bad = fake_drone(&state, "b2e4d1aa", |command| match command {
            DroneCommand::Fetch { .. } => Some(CommandReply::Fetch { error: None }),
            DroneCommand::Deploy(_) => Some(CommandReply::Deploy {
                error: Some(SubprocessFailure {
                    code: Some(1),
                    signal: None,
                    message: None,
                }),
            }),
            _ => None,
        });

        let failures = deploy(&state, &Selector::All, "webapp", "c1").await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].drone, bad);
        assert_ne!(failures[0].drone, good);
        assert_eq!(failures[0].phase, DeployPhase::Deploy);
    }

    #[tokio::test]
    async fn test_deploy_counts_unanswered_call_as_failure() {
        let state = test_state();
        // Drops every reply sender, simulating a dying link
        fake_drone(&state, "3fa91c07", |_| None);

        let failures = deploy(&state, &Selector::All, "webapp", "c1").await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].phase, DeployPhase::Fetch);
        assert!(failures[0].message.as_deref().unwrap().contains("link lost"));
    }

    #[tokio::test]
    async fn test_spawn_injects_drone_id_unless_caller_set_it() {
        let state = test_state();
        let (seen_tx, mut seen_rx) = mpsc::channel(8);
        fake_drone(&state, "3fa91c07", move |command| match command {
            DroneCommand::Spawn(req) => {
                seen_tx.try_send(req.env).unwrap();
                Some(CommandReply::Spawn {
                    pids: vec!["b2e4d1".parse().unwrap()],
                })
            }
            _ => None,
        });

        let request = SpawnRequest {
            repo: "webapp".to_string(),
            commit: "c1".to_string(),
            command: vec!["node".to_string()],
            count: 1,
            limit: None,
            errlimit: None,
            env: BTreeMap::new(),
            cwd: None,
            once: false,
        };
        let procs = spawn(&state, &Selector::All, &request).await;
        assert_eq!(procs.len(), 1);

        let env = seen_rx.recv().await.unwrap();
        assert_eq!(env.get("DRONE_ID").map(String::as_str), Some("3fa91c07"));

        // A caller-pinned DRONE_ID survives untouched
        let mut pinned = request.clone();
        pinned
            .env
            .insert("DRONE_ID".to_string(), "custom".to_string());
        spawn(&state, &Selector::All, &pinned).await;
        let env = seen_rx.recv().await.unwrap();
        assert_eq!(env.get("DRONE_ID").map(String::as_str), Some("custom"));
    }

    #[tokio::test]
    async fn test_stop_aggregates_pids_per_drone() {
        let state = test_state();
        let a = fake_drone(&state, "3fa91c07", |command| match command {
            DroneCommand::Stop { .. } => Some(CommandReply::Stop {
                pids: vec!["b2e4d1".parse().unwrap()],
            }),
            _ => None,
        });
        let b = fake_drone(&state, "b2e4d1aa", |command| match command {
            DroneCommand::Stop { .. } => Some(CommandReply::Stop { pids: vec![] }),
            _ => None,
        });

        let procs = stop(&state, &Selector::All, &StopTarget::All).await;
        assert_eq!(procs.len(), 2);
        assert_eq!(procs[&a].len(), 1);
        assert!(procs[&b].is_empty());
    }

    #[tokio::test]
    async fn test_ps_streams_addr_data_and_one_end() {
        let state = test_state();
        let answering = fake_drone(&state, "3fa91c07", |command| match command {
            DroneCommand::Ps => Some(CommandReply::Ps {
                procs: procs_fixture(),
            }),
            _ => None,
        });
        let silent = fake_drone(&state, "b2e4d1aa", |_| None);

        let mut rx = ps(&state, &Selector::All);
        let mut addrs = Vec::new();
        let mut datas = Vec::new();
        let mut ends = 0;
        while let Some(event) = rx.recv().await {
            match event {
                PsEvent::Addr { drone, .. } => addrs.push(drone),
                PsEvent::Data { drone, procs } => {
                    assert!(!procs.is_empty());
                    datas.push(drone);
                }
                PsEvent::End => ends += 1,
            }
        }

        addrs.sort();
        assert_eq!(addrs, {
            let mut expected = vec![answering, silent];
            expected.sort();
            expected
        });
        assert_eq!(datas, vec![answering]);
        assert_eq!(ends, 1);
    }

    #[tokio::test]
    async fn test_ps_with_empty_selection_ends_immediately() {
        let state = test_state();
        let mut rx = ps(&state, &Selector::All);
        assert_eq!(rx.recv().await, Some(PsEvent::End));
        assert_eq!(rx.recv().await, None);
    }
}
