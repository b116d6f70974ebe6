use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to spawn git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {args} failed: {stderr}")]
    Failed { args: String, stderr: String },
}

/// Thin seam over the git subprocess so the cache, indexer and auto-fix
/// engine can be tested without a real repository.
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Run `git <args>` in `dir` (or the process cwd for `clone`), returning
    /// trimmed stdout. Non-zero exit surfaces stderr in the error.
    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String, GitError>;
}

#[async_trait]
impl<T: GitRunner + ?Sized> GitRunner for Arc<T> {
    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String, GitError> {
        (**self).run(dir, args).await
    }
}

/// Production implementation driving the system `git` binary.
#[derive(Debug, Clone, Default)]
pub struct SystemGit;

impl SystemGit {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GitRunner for SystemGit {
    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String, GitError> {
        let mut command = Command::new("git");
        command.args(args);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        debug!(args = %args.join(" "), ?dir, "running git");

        let output = command.output().await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(GitError::Failed {
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
