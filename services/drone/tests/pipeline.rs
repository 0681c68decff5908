//! Integration tests for the git mirror/deploy pipeline, backed by real
//! local git repositories.

use std::path::{Path, PathBuf};

use gitfleet_drone::pipeline::Pipeline;
use tempfile::TempDir;
use tokio::process::Command;

async fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.email=test@example.com",
            "-c",
            "user.name=test",
        ])
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

/// Create an origin repository named `app` with one commit, returning
/// (origin parent dir, commit hash).
async fn origin_with_commit() -> (TempDir, String) {
    let parent = TempDir::new().unwrap();
    let repo = parent.path().join("app");
    std::fs::create_dir(&repo).unwrap();
    git(&repo, &["init", "--quiet"]).await;
    std::fs::write(repo.join("server.txt"), "v1\n").unwrap();
    git(&repo, &["add", "."]).await;
    git(&repo, &["commit", "--quiet", "-m", "v1"]).await;
    let commit = git(&repo, &["rev-parse", "HEAD"]).await;
    (parent, commit)
}

fn pipeline(base: &TempDir, origin_parent: &TempDir) -> Pipeline {
    Pipeline::new(
        base.path().join("repos"),
        base.path().join("deploy"),
        origin_parent.path().display().to_string(),
    )
}

#[tokio::test]
async fn fetch_creates_bare_mirror() {
    let (origin, commit) = origin_with_commit().await;
    let base = TempDir::new().unwrap();
    let pipeline = pipeline(&base, &origin);

    pipeline.fetch("app").await.unwrap();

    let mirror = base.path().join("repos").join("app.git");
    assert!(mirror.join("HEAD").exists());
    let resolved = git(&mirror, &["rev-parse", &commit]).await;
    assert_eq!(resolved, commit);
}

#[tokio::test]
async fn fetch_picks_up_new_commits() {
    let (origin, _first) = origin_with_commit().await;
    let base = TempDir::new().unwrap();
    let pipeline = pipeline(&base, &origin);
    pipeline.fetch("app").await.unwrap();

    let repo = origin.path().join("app");
    std::fs::write(repo.join("server.txt"), "v2\n").unwrap();
    git(&repo, &["commit", "--quiet", "-am", "v2"]).await;
    let second = git(&repo, &["rev-parse", "HEAD"]).await;

    pipeline.fetch("app").await.unwrap();

    let mirror = base.path().join("repos").join("app.git");
    let resolved = git(&mirror, &["rev-parse", &second]).await;
    assert_eq!(resolved, second);
}

#[tokio::test]
async fn deploy_checks_out_the_requested_commit() {
    let (origin, first) = origin_with_commit().await;
    let repo = origin.path().join("app");
    std::fs::write(repo.join("server.txt"), "v2\n").unwrap();
    git(&repo, &["commit", "--quiet", "-am", "v2"]).await;

    let base = TempDir::new().unwrap();
    let pipeline = pipeline(&base, &origin);
    pipeline.fetch("app").await.unwrap();

    // Deploying the first commit yields the old content
    let tree = pipeline.deploy("app", &first).await.unwrap();
    assert_eq!(
        tree,
        PathBuf::from(base.path().join("deploy").join(format!("app.{first}")))
    );
    let content = std::fs::read_to_string(tree.join("server.txt")).unwrap();
    assert_eq!(content, "v1\n");
}

#[tokio::test]
async fn redeploy_of_existing_tree_is_idempotent() {
    let (origin, commit) = origin_with_commit().await;
    let base = TempDir::new().unwrap();
    let pipeline = pipeline(&base, &origin);
    pipeline.fetch("app").await.unwrap();

    let first = pipeline.deploy("app", &commit).await.unwrap();
    let second = pipeline.deploy("app", &commit).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn fetch_of_missing_repo_reports_the_failing_step() {
    let (origin, _) = origin_with_commit().await;
    let base = TempDir::new().unwrap();
    let pipeline = pipeline(&base, &origin);

    let err = pipeline.fetch("nope").await.unwrap_err();
    assert_eq!(err.step, "fetch");
    let failure = err.into_failure();
    assert!(failure.code.is_some() || failure.message.is_some());
}

#[tokio::test]
async fn deploy_of_unknown_commit_fails_at_checkout() {
    let (origin, _) = origin_with_commit().await;
    let base = TempDir::new().unwrap();
    let pipeline = pipeline(&base, &origin);
    pipeline.fetch("app").await.unwrap();

    let err = pipeline
        .deploy("app", "0000000000000000000000000000000000000000")
        .await
        .unwrap_err();
    assert_eq!(err.step, "checkout");
}
