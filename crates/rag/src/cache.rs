use common::RefreshPolicy;
use domain::RepoTarget;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tools::{GitError, GitRunner};
use tracing::info;

/// Characters percent-encoded in the userinfo part of a clone URL. Tokens
/// containing `@` or `:` must not break the URL structure.
const USERINFO: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'=')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'|');

#[derive(Debug, Error)]
pub enum RepoCacheError {
    #[error("git operation failed: {0}")]
    Git(#[from] GitError),

    #[error("cache directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// Credential-embedded HTTPS clone URL for a target.
pub fn clone_url(target: &RepoTarget, token: Option<&str>) -> String {
    match token {
        Some(token) => format!(
            "https://{}@{}/{}/{}.git",
            utf8_percent_encode(token, USERINFO),
            target.host,
            target.owner,
            target.repo
        ),
        None => format!(
            "https://{}/{}/{}.git",
            target.host, target.owner, target.repo
        ),
    }
}

/// Maintains the on-disk shallow clone the indexer and auto-fix engine work
/// against. No partial state survives a git failure: the caller sees the
/// error and the next refresh starts over.
pub struct RepoCache<G> {
    git: G,
    cache_dir: PathBuf,
}

impl<G: GitRunner> RepoCache<G> {
    pub fn new(git: G, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            git,
            cache_dir: cache_dir.into(),
        }
    }

    /// Directory the clone of `target` lives in.
    pub fn clone_dir(&self, target: &RepoTarget) -> PathBuf {
        self.cache_dir
            .join(format!("{}-{}", target.owner, target.repo))
    }

    /// Ensure a clone exists at the configured branch tip and return its
    /// path. A missing directory (or `reclone`) does a depth-1 clone;
    /// otherwise the clone is refreshed with fetch + hard reset.
    pub async fn ensure(
        &self,
        target: &RepoTarget,
        token: Option<&str>,
        branch: &str,
        policy: RefreshPolicy,
    ) -> Result<PathBuf, RepoCacheError> {
        let dir = self.clone_dir(target);

        if dir.exists() && policy == RefreshPolicy::Reclone {
            std::fs::remove_dir_all(&dir)?;
        }

        if !dir.exists() {
            std::fs::create_dir_all(&self.cache_dir)?;
            let url = clone_url(target, token);
            let dir_str = dir.to_string_lossy().to_string();
            self.git
                .run(
                    None,
                    &["clone", "--depth", "1", "--branch", branch, &url, &dir_str],
                )
                .await?;
            info!(repo = %target.repo_key(), branch, "cloned repository cache");
        } else {
            self.git.run(Some(&dir), &["fetch", "origin", branch]).await?;
            self.git
                .run(Some(&dir), &["reset", "--hard", &format!("origin/{branch}")])
                .await?;
            info!(repo = %target.repo_key(), branch, "refreshed repository cache");
        }

        Ok(dir)
    }
}

/// Current HEAD of a local checkout, if resolvable.
pub async fn head_sha<G: GitRunner + ?Sized>(git: &G, repo: &Path) -> Option<String> {
    git.run(Some(repo), &["rev-parse", "HEAD"])
        .await
        .ok()
        .filter(|sha| !sha.is_empty())
}
