//! Git mirror and deploy pipeline.
//!
//! Fetch keeps a bare mirror per repository under `repos/<name>.git`; deploy
//! clones the local mirror into `deploy/<name>.<commit>` and checks out the
//! requested commit. Both shell out to the system `git`.

use std::path::{Path, PathBuf};

use gitfleet_wire::SubprocessFailure;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::supervisor::exit_signal;

/// A git step that did not complete.
#[derive(Debug, Error)]
#[error("git {step} failed: {failure}")]
pub struct GitError {
    /// The step that failed (`init`, `fetch`, `clone`, `checkout`).
    pub step: &'static str,
    pub failure: SubprocessFailure,
}

impl GitError {
    fn new(step: &'static str, failure: SubprocessFailure) -> Self {
        Self { step, failure }
    }

    /// The wire-level failure record for fan-in reporting.
    pub fn into_failure(self) -> SubprocessFailure {
        self.failure
    }
}

/// Performs fetch and deploy operations against the local filesystem.
#[derive(Debug, Clone)]
pub struct Pipeline {
    repo_dir: PathBuf,
    deploy_dir: PathBuf,
    /// Base URL of the hub's git endpoint, e.g. `http://hub:7001`.
    git_url: String,
}

impl Pipeline {
    pub fn new(repo_dir: PathBuf, deploy_dir: PathBuf, git_url: String) -> Self {
        Self {
            repo_dir,
            deploy_dir,
            git_url,
        }
    }

    /// Path of the bare mirror for `repo`.
    pub fn mirror_path(&self, repo: &str) -> PathBuf {
        self.repo_dir.join(format!("{repo}.git"))
    }

    /// Path of the working tree for `repo` at `commit`.
    pub fn working_tree(&self, repo: &str, commit: &str) -> PathBuf {
        self.deploy_dir.join(format!("{repo}.{commit}"))
    }

    /// Update the bare mirror of `repo` from the hub. Creates the mirror on
    /// first fetch.
    pub async fn fetch(&self, repo: &str) -> Result<(), GitError> {
        let mirror = self.mirror_path(repo);
        if tokio::fs::create_dir_all(&mirror).await.is_err() {
            return Err(GitError::new(
                "init",
                SubprocessFailure {
                    code: None,
                    signal: None,
                    message: Some(format!("cannot create {}", mirror.display())),
                },
            ));
        }

        run_git("init", &mirror, &["init", "--bare", "--quiet"]).await?;

        let remote = format!("{}/{repo}", self.git_url);
        run_git(
            "fetch",
            &mirror,
            &["fetch", "--force", &remote, "+refs/*:refs/*"],
        )
        .await?;

        debug!(repo = %repo, mirror = %mirror.display(), "mirror updated");
        Ok(())
    }

    /// Materialize a working tree for `repo` at `commit` from the local
    /// mirror. Re-deploying an existing tree checks the commit out again in
    /// place.
    pub async fn deploy(&self, repo: &str, commit: &str) -> Result<PathBuf, GitError> {
        let mirror = self.mirror_path(repo);
        let tree = self.working_tree(repo, commit);

        if !tree.exists() {
            if tokio::fs::create_dir_all(&self.deploy_dir).await.is_err() {
                return Err(GitError::new(
                    "clone",
                    SubprocessFailure {
                        code: None,
                        signal: None,
                        message: Some(format!("cannot create {}", self.deploy_dir.display())),
                    },
                ));
            }
            let mirror_str = mirror.display().to_string();
            let tree_str = tree.display().to_string();
            run_git(
                "clone",
                &self.deploy_dir,
                &["clone", "--quiet", &mirror_str, &tree_str],
            )
            .await?;
        }

        run_git("checkout", &tree, &["checkout", "--quiet", commit]).await?;

        info!(repo = %repo, commit = %commit, tree = %tree.display(), "deployed");
        Ok(tree)
    }
}

/// Run one git command in `dir`, mapping any failure to a [`GitError`].
async fn run_git(step: &'static str, dir: &Path, args: &[&str]) -> Result<(), GitError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| {
            GitError::new(
                step,
                SubprocessFailure {
                    code: None,
                    signal: None,
                    message: Some(e.to_string()),
                },
            )
        })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(GitError::new(
        step,
        SubprocessFailure {
            code: output.status.code(),
            signal: exit_signal(&output.status),
            message: if stderr.trim().is_empty() {
                None
            } else {
                Some(stderr.trim().to_string())
            },
        },
    ))
}
