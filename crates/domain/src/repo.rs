use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical host for which the repo key omits the host prefix.
pub const CANONICAL_HOST: &str = "github.com";

/// Identity of the repository all per-repo state is partitioned by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTarget {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

impl RepoTarget {
    pub fn new(host: impl Into<String>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Partitioning key for all per-repo state: `owner/repo` on the
    /// canonical host, `host/owner/repo` elsewhere.
    pub fn repo_key(&self) -> String {
        if self.host == CANONICAL_HOST {
            format!("{}/{}", self.owner, self.repo)
        } else {
            format!("{}/{}/{}", self.host, self.owner, self.repo)
        }
    }

    /// `owner/repo`, the forge API path segment.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// One indexed slice of a source file.
///
/// Row identity is `<repo_key>:<path>:<chunk_index>`; `(repo_key, path,
/// chunk_index)` is unique in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoChunk {
    pub repo_key: String,
    /// Forward-slash relative path within the repository.
    pub path: String,
    pub chunk_index: u32,
    pub content: String,
    /// SHA-256 hex of `content`.
    pub content_hash: String,
    pub embedding: Option<Vec<f32>>,
}

impl RepoChunk {
    pub fn row_id(&self) -> String {
        format!("{}:{}:{}", self.repo_key, self.path, self.chunk_index)
    }
}

/// Last revision at which the vector store was synchronised for a repo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoIndexState {
    pub repo_key: String,
    pub head_sha: String,
    pub updated_at: DateTime<Utc>,
}

/// A similarity-search hit handed to the fix synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub path: String,
    pub content: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_host_key_omits_host() {
        let t = RepoTarget::new("github.com", "acme", "shop");
        assert_eq!(t.repo_key(), "acme/shop");
    }

    #[test]
    fn other_host_key_includes_host() {
        let t = RepoTarget::new("git.example.org", "acme", "shop");
        assert_eq!(t.repo_key(), "git.example.org/acme/shop");
    }

    #[test]
    fn chunk_row_id_concatenates_identity() {
        let c = RepoChunk {
            repo_key: "acme/shop".into(),
            path: "src/app.ts".into(),
            chunk_index: 3,
            content: String::new(),
            content_hash: String::new(),
            embedding: None,
        };
        assert_eq!(c.row_id(), "acme/shop:src/app.ts:3");
    }
}
