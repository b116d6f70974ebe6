use crate::validate::{is_denylisted, strip_non_diff_lines};
use domain::RewriteFile;
use rag::EXCLUDED_DIRS;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tools::{GitError, GitRunner};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("patch did not apply: {0}")]
    Apply(#[from] GitError),

    #[error("rewrite escapes the workspace: {0}")]
    PathEscape(String),
}

/// A disposable copy of the repo tree the sandbox runs against.
pub struct StagedWorkspace {
    /// `.workspaces/<id>` directory holding the copy and scratch files.
    pub root: PathBuf,
    /// `<root>/repo`, the tree the proposal is applied to.
    pub repo: PathBuf,
}

impl StagedWorkspace {
    /// Best-effort cleanup; staging directories are disposable.
    pub fn cleanup(&self) {
        if let Err(err) = std::fs::remove_dir_all(&self.root) {
            warn!(root = %self.root.display(), error = %err, "failed to clean workspace");
        }
    }
}

/// Copy the repo tree into a sibling `.workspaces/<random>/repo`, excluding
/// the ignored directories and any denylisted path.
pub fn stage_workspace(repo_path: &Path) -> Result<StagedWorkspace, WorkspaceError> {
    let parent = repo_path.parent().unwrap_or(repo_path);
    let root = parent.join(".workspaces").join(Uuid::new_v4().to_string());
    let repo = root.join("repo");
    std::fs::create_dir_all(&repo)?;
    copy_tree(repo_path, &repo, "")?;
    debug!(workspace = %repo.display(), "staged workspace copy");
    Ok(StagedWorkspace { root, repo })
}

fn copy_tree(src: &Path, dst: &Path, rel_prefix: &str) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let rel = if rel_prefix.is_empty() {
            name.clone()
        } else {
            format!("{rel_prefix}/{name}")
        };
        let from = entry.path();
        let to = dst.join(&name);

        if from.is_dir() {
            if EXCLUDED_DIRS.contains(&name.as_str()) {
                continue;
            }
            std::fs::create_dir_all(&to)?;
            copy_tree(&from, &to, &rel)?;
        } else if from.is_file() {
            if is_denylisted(&rel) {
                continue;
            }
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Apply a unified diff in `dir` with `git apply --whitespace=fix`. If the
/// first attempt fails, retry once with non-diff lines stripped out.
pub async fn apply_diff_with_retry<G: GitRunner + ?Sized>(
    git: &G,
    dir: &Path,
    scratch_dir: &Path,
    diff: &str,
) -> Result<(), WorkspaceError> {
    let patch_path = scratch_dir.join("proposal.patch");
    let mut patch = diff.to_string();
    if !patch.ends_with('\n') {
        patch.push('\n');
    }
    std::fs::write(&patch_path, &patch)?;
    let patch_str = patch_path.to_string_lossy().to_string();

    match git
        .run(Some(dir), &["apply", "--whitespace=fix", &patch_str])
        .await
    {
        Ok(_) => return Ok(()),
        Err(err) => {
            warn!(error = %err, "git apply failed, retrying with stripped patch");
        }
    }

    let mut stripped = strip_non_diff_lines(diff);
    if !stripped.ends_with('\n') {
        stripped.push('\n');
    }
    std::fs::write(&patch_path, &stripped)?;
    git.run(Some(dir), &["apply", "--whitespace=fix", &patch_str])
        .await?;
    Ok(())
}

/// Write rewrite files into `dir`, creating parent directories. Paths must
/// stay inside the tree.
pub fn apply_rewrite(dir: &Path, files: &[RewriteFile]) -> Result<(), WorkspaceError> {
    for file in files {
        if file.path.split('/').any(|segment| segment == "..") || file.path.starts_with('/') {
            return Err(WorkspaceError::PathEscape(file.path.clone()));
        }
        let target = dir.join(&file.path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &file.content)?;
    }
    Ok(())
}
