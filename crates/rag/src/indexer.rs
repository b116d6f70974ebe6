use crate::cache::head_sha;
use crate::chunker::{chunk_text, hash_content};
use crate::walker::walk_text_files;
use domain::RepoChunk;
use embeddings::Embedder;
use memory::{ChunkStore, StoreError};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tools::GitRunner;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to walk repository: {0}")]
    Walk(#[from] std::io::Error),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub files: usize,
    pub chunks_embedded: usize,
    pub chunks_unchanged: usize,
    pub rows_deleted: u64,
    pub skipped_up_to_date: bool,
}

/// Synchronise the vector store with the repository tree at `repo_path`.
///
/// The algorithm converges: after a successful run the store holds exactly
/// the `(path, chunk_index)` set produced by walking the tree, and the index
/// state records the revision it was synchronised at. Chunks whose stored
/// hash already matches are neither re-embedded nor re-written, so a second
/// run at the same revision performs zero embedding calls.
pub async fn index_repo(
    store: &dyn ChunkStore,
    embedder: Option<&dyn Embedder>,
    git: &dyn GitRunner,
    repo_path: &Path,
    repo_key: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<IndexStats, IndexError> {
    let head = head_sha(git, repo_path).await;

    if let Some(head) = &head {
        if let Some(state) = store.index_state(repo_key).await? {
            if &state.head_sha == head && store.count_chunks(repo_key).await? > 0 {
                debug!(repo_key, head, "index already at head, skipping");
                return Ok(IndexStats {
                    skipped_up_to_date: true,
                    ..IndexStats::default()
                });
            }
        }
    } else {
        // Without a resolvable HEAD we still sync the tree, but leave the
        // index state untouched so the next run reconsiders from scratch.
        warn!(repo_key, "could not resolve HEAD, indexing without state update");
    }

    let files = walk_text_files(repo_path)?;
    let mut stats = IndexStats {
        files: files.len(),
        ..IndexStats::default()
    };
    let mut seen_paths: HashSet<String> = HashSet::with_capacity(files.len());

    for file in &files {
        let chunks = chunk_text(&file.content, chunk_size, chunk_overlap);
        let existing = store.chunk_hashes(repo_key, &file.path).await?;

        for (index, content) in chunks.iter().enumerate() {
            let index = index as u32;
            let content_hash = hash_content(content);
            if existing.get(&index) == Some(&content_hash) {
                stats.chunks_unchanged += 1;
                continue;
            }

            let embedding = match embedder {
                Some(embedder) => match embedder.embed(content).await {
                    Ok(vector) => Some(vector),
                    Err(err) => {
                        warn!(path = %file.path, chunk = index, error = %err, "embedding failed, storing chunk without vector");
                        None
                    }
                },
                None => None,
            };
            if embedding.is_some() {
                stats.chunks_embedded += 1;
            }

            store
                .upsert_chunk(&RepoChunk {
                    repo_key: repo_key.to_string(),
                    path: file.path.clone(),
                    chunk_index: index,
                    content: content.clone(),
                    content_hash,
                    embedding,
                })
                .await?;
        }

        // A shrunk file leaves stale high-index rows behind; drop them.
        stats.rows_deleted += store
            .delete_chunks_beyond(repo_key, &file.path, chunks.len().saturating_sub(1) as u32)
            .await?;

        seen_paths.insert(file.path.clone());
    }

    // Deleted and renamed files: remove every row whose path vanished.
    stats.rows_deleted += store.delete_paths_not_in(repo_key, &seen_paths).await?;

    if let Some(head) = head {
        store.set_index_state(repo_key, &head).await?;
    }

    info!(
        repo_key,
        files = stats.files,
        embedded = stats.chunks_embedded,
        unchanged = stats.chunks_unchanged,
        deleted = stats.rows_deleted,
        "index synchronised"
    );
    Ok(stats)
}
