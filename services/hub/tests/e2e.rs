//! End-to-end tests: a real hub and a real drone agent over loopback, with
//! local git repositories standing in for the git endpoint.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use gitfleet_hub::{AppState, Config};
use gitfleet_id::DroneId;
use gitfleet_wire::{
    DeployResponse, ListDronesResponse, PsEvent, SpawnResponse, StopResponse,
};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;

const SECRET: &str = "s3cret";

struct Hub {
    addr: SocketAddr,
    basedir: TempDir,
}

async fn start_hub(git_url: String) -> Hub {
    let basedir = TempDir::new().unwrap();
    std::fs::create_dir_all(basedir.path().join("repos")).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = Config {
        listen: addr,
        secret: SECRET.to_string(),
        basedir: basedir.path().to_path_buf(),
        git_url,
        call_timeout: Duration::from_secs(10),
    };
    tokio::spawn(gitfleet_hub::serve(listener, AppState::new(config)));
    Hub { addr, basedir }
}

fn start_drone(hub: SocketAddr, secret: &str) -> (DroneId, TempDir) {
    let basedir = TempDir::new().unwrap();
    let config = gitfleet_drone::Config {
        drone_id: DroneId::random(),
        hub: hub.to_string(),
        secret: secret.to_string(),
        basedir: basedir.path().to_path_buf(),
    };
    let id = config.drone_id;
    tokio::spawn(async move {
        let _ = gitfleet_drone::run(config).await;
    });
    (id, basedir)
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

fn api(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

async fn list_drones(addr: SocketAddr) -> ListDronesResponse {
    client()
        .get(api(addr, "/v1/drones"))
        .bearer_auth(SECRET)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn wait_for_drones(addr: SocketAddr, count: usize) -> ListDronesResponse {
    for _ in 0..100 {
        let drones = list_drones(addr).await;
        if drones.drones.len() == count {
            return drones;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("registry never reached {count} drones");
}

async fn git(dir: &Path, args: &[&str]) -> String {
    let output = tokio::process::Command::new("git")
        .args(["-c", "user.email=test@example.com", "-c", "user.name=test"])
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A directory of origin repositories the drones can fetch from, standing in
/// for the git endpoint. Returns (dir, commit of `webapp`).
async fn origin_repos() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let repo = dir.path().join("webapp");
    std::fs::create_dir(&repo).unwrap();
    git(&repo, &["init", "--quiet"]).await;
    std::fs::write(repo.join("server.sh"), "#!/bin/sh\nsleep 30\n").unwrap();
    git(&repo, &["add", "."]).await;
    git(&repo, &["commit", "--quiet", "-m", "v1"]).await;
    let commit = git(&repo, &["rev-parse", "HEAD"]).await;
    (dir, commit)
}

async fn collect_ps(addr: SocketAddr, query: &str) -> Vec<PsEvent> {
    let mut request = format!("ws://{addr}/v1/ps{query}")
        .into_client_request()
        .unwrap();
    request.headers_mut().insert(
        AUTHORIZATION,
        format!("Bearer {SECRET}").parse().unwrap(),
    );
    let (mut ws, _) = connect_async(request).await.unwrap();

    let mut events = Vec::new();
    while let Some(Ok(msg)) = ws.next().await {
        match msg {
            Message::Text(text) => {
                let event: PsEvent = serde_json::from_str(&text).unwrap();
                let done = event == PsEvent::End;
                events.push(event);
                if done {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    events
}

#[tokio::test]
async fn drone_registers_and_control_api_sees_it() {
    let (origins, _commit) = origin_repos().await;
    let hub = start_hub(origins.path().display().to_string()).await;
    let (drone_id, _drone_dir) = start_drone(hub.addr, SECRET);

    let drones = wait_for_drones(hub.addr, 1).await;
    assert_eq!(drones.drones[0].id, drone_id);
    assert!(drones.drones[0].addr.starts_with("127.0.0.1:"));
}

#[tokio::test]
async fn drone_with_bad_secret_is_denied() {
    let (origins, _commit) = origin_repos().await;
    let hub = start_hub(origins.path().display().to_string()).await;
    let (_id, _dir) = start_drone(hub.addr, "wrong");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(list_drones(hub.addr).await.drones.is_empty());
}

#[tokio::test]
async fn control_api_rejects_missing_bearer() {
    let (origins, _commit) = origin_repos().await;
    let hub = start_hub(origins.path().display().to_string()).await;

    let response = client()
        .get(api(hub.addr, "/v1/drones"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = client()
        .get(api(hub.addr, "/v1/drones"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn deploy_materializes_a_working_tree_on_the_drone() {
    let (origins, commit) = origin_repos().await;
    let hub = start_hub(origins.path().display().to_string()).await;
    let (_id, drone_dir) = start_drone(hub.addr, SECRET);
    wait_for_drones(hub.addr, 1).await;

    let response: DeployResponse = client()
        .post(api(hub.addr, "/v1/deploy"))
        .bearer_auth(SECRET)
        .json(&serde_json::json!({"repo": "webapp", "commit": commit}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(response.failures.is_empty(), "{:?}", response.failures);

    let tree = drone_dir
        .path()
        .join("deploy")
        .join(format!("webapp.{commit}"));
    assert!(tree.join("server.sh").exists());
}

#[tokio::test]
async fn deploy_of_unknown_repo_reports_fetch_failures() {
    let (origins, _commit) = origin_repos().await;
    let hub = start_hub(origins.path().display().to_string()).await;
    let (drone_id, _drone_dir) = start_drone(hub.addr, SECRET);
    wait_for_drones(hub.addr, 1).await;

    let response: DeployResponse = client()
        .post(api(hub.addr, "/v1/deploy"))
        .bearer_auth(SECRET)
        .json(&serde_json::json!({"repo": "nope", "commit": "c1"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response.failures.len(), 1);
    assert_eq!(response.failures[0].drone, drone_id);
}

#[tokio::test]
async fn spawn_ps_stop_roundtrip() {
    let (origins, _commit) = origin_repos().await;
    let hub = start_hub(origins.path().display().to_string()).await;
    let (drone_id, drone_dir) = start_drone(hub.addr, SECRET);
    wait_for_drones(hub.addr, 1).await;

    let cwd = drone_dir.path().display().to_string();
    let spawned: SpawnResponse = client()
        .post(api(hub.addr, "/v1/spawn"))
        .bearer_auth(SECRET)
        .json(&serde_json::json!({
            "repo": "webapp",
            "commit": "c1",
            "command": ["sh", "-c", "sleep 30"],
            "count": 2,
            "cwd": cwd,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let pids = spawned.procs.get(&drone_id).expect("drone in spawn result");
    assert_eq!(pids.len(), 2);

    let events = collect_ps(hub.addr, "").await;
    let addrs = events
        .iter()
        .filter(|e| matches!(e, PsEvent::Addr { .. }))
        .count();
    assert_eq!(addrs, 1);
    let procs = events
        .iter()
        .find_map(|e| match e {
            PsEvent::Data { drone, procs } if *drone == drone_id => Some(procs.clone()),
            _ => None,
        })
        .expect("data event from the drone");
    assert_eq!(procs.len(), 2);
    for pid in pids {
        assert!(procs.contains_key(pid));
    }
    assert_eq!(events.last(), Some(&PsEvent::End));

    let stopped: StopResponse = client()
        .post(api(hub.addr, "/v1/stop"))
        .bearer_auth(SECRET)
        .json(&serde_json::json!({"target": {"kind": "all"}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stopped.procs[&drone_id].len(), 2);

    let events = collect_ps(hub.addr, "").await;
    let empty = events.iter().all(|e| match e {
        PsEvent::Data { procs, .. } => procs.is_empty(),
        _ => true,
    });
    assert!(empty);
}

#[tokio::test]
async fn push_hook_warms_every_drone_mirror() {
    let (origins, _commit) = origin_repos().await;
    let hub = start_hub(origins.path().display().to_string()).await;
    let (_a, dir_a) = start_drone(hub.addr, SECRET);
    let (_b, dir_b) = start_drone(hub.addr, SECRET);
    wait_for_drones(hub.addr, 2).await;

    let response = client()
        .post(api(hub.addr, "/v1/hooks/push/webapp"))
        .bearer_auth(SECRET)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    // No deploy ever happened; the hook alone must update both mirrors
    for dir in [&dir_a, &dir_b] {
        let mirror = dir.path().join("repos").join("webapp.git");
        let mut found = false;
        for _ in 0..100 {
            if mirror.join("HEAD").exists() {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(found, "mirror missing at {}", mirror.display());
    }
}

#[tokio::test]
async fn catch_up_fetch_runs_on_registration() {
    let (origins, _commit) = origin_repos().await;
    let hub = start_hub(origins.path().display().to_string()).await;
    // The hub already holds this repository when the drone first connects
    std::fs::create_dir_all(hub.basedir.path().join("repos").join("webapp.git")).unwrap();

    let (_id, drone_dir) = start_drone(hub.addr, SECRET);
    wait_for_drones(hub.addr, 1).await;

    let mirror = drone_dir.path().join("repos").join("webapp.git");
    let mut found = false;
    for _ in 0..100 {
        if mirror.join("HEAD").exists() {
            found = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(found, "catch-up never fetched the mirror");
}
