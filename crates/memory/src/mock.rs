//! In-memory [`ChunkStore`] used by indexer, retriever and workflow tests.

use crate::store::{ChunkStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use domain::{RepoChunk, RepoIndexState, RetrievedChunk};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryChunkStore {
    /// repo_key -> (path, chunk_index) -> chunk
    rows: Mutex<HashMap<String, BTreeMap<(String, u32), RepoChunk>>>,
    state: Mutex<HashMap<String, RepoIndexState>>,
    upserts: AtomicUsize,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn rows_for(&self, repo_key: &str) -> Vec<RepoChunk> {
        self.rows
            .lock()
            .expect("store lock")
            .get(repo_key)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn paths_for(&self, repo_key: &str) -> HashSet<String> {
        self.rows_for(repo_key)
            .into_iter()
            .map(|c| c.path)
            .collect()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn chunk_hashes(
        &self,
        repo_key: &str,
        path: &str,
    ) -> Result<HashMap<u32, String>, StoreError> {
        let rows = self.rows.lock().expect("store lock");
        Ok(rows
            .get(repo_key)
            .map(|rows| {
                rows.iter()
                    .filter(|((p, _), _)| p == path)
                    .map(|((_, idx), chunk)| (*idx, chunk.content_hash.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_chunk(&self, chunk: &RepoChunk) -> Result<(), StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().expect("store lock");
        rows.entry(chunk.repo_key.clone())
            .or_default()
            .insert((chunk.path.clone(), chunk.chunk_index), chunk.clone());
        Ok(())
    }

    async fn delete_chunks_beyond(
        &self,
        repo_key: &str,
        path: &str,
        last_index: u32,
    ) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().expect("store lock");
        let Some(repo_rows) = rows.get_mut(repo_key) else {
            return Ok(0);
        };
        let before = repo_rows.len();
        repo_rows.retain(|(p, idx), _| p != path || *idx <= last_index);
        Ok((before - repo_rows.len()) as u64)
    }

    async fn delete_paths_not_in(
        &self,
        repo_key: &str,
        keep: &HashSet<String>,
    ) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().expect("store lock");
        let Some(repo_rows) = rows.get_mut(repo_key) else {
            return Ok(0);
        };
        let before = repo_rows.len();
        repo_rows.retain(|(p, _), _| keep.contains(p));
        Ok((before - repo_rows.len()) as u64)
    }

    async fn count_chunks(&self, repo_key: &str) -> Result<i64, StoreError> {
        let rows = self.rows.lock().expect("store lock");
        Ok(rows.get(repo_key).map(|r| r.len() as i64).unwrap_or(0))
    }

    async fn similarity_search(
        &self,
        repo_key: &str,
        query: &[f32],
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let rows = self.rows.lock().expect("store lock");
        let mut hits: Vec<RetrievedChunk> = rows
            .get(repo_key)
            .map(|rows| {
                rows.values()
                    .filter_map(|chunk| {
                        let embedding = chunk.embedding.as_ref()?;
                        let score = cosine_similarity(embedding, query);
                        (score >= min_score).then(|| RetrievedChunk {
                            path: chunk.path.clone(),
                            content: chunk.content.clone(),
                            score,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn index_state(&self, repo_key: &str) -> Result<Option<RepoIndexState>, StoreError> {
        Ok(self.state.lock().expect("store lock").get(repo_key).cloned())
    }

    async fn set_index_state(&self, repo_key: &str, head_sha: &str) -> Result<(), StoreError> {
        self.state.lock().expect("store lock").insert(
            repo_key.to_string(),
            RepoIndexState {
                repo_key: repo_key.to_string(),
                head_sha: head_sha.to_string(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(path: &str, idx: u32, embedding: Option<Vec<f32>>) -> RepoChunk {
        RepoChunk {
            repo_key: "acme/shop".into(),
            path: path.into(),
            chunk_index: idx,
            content: format!("{path}:{idx}"),
            content_hash: format!("h{idx}"),
            embedding,
        }
    }

    #[tokio::test]
    async fn upsert_and_bounded_delete() {
        let store = InMemoryChunkStore::new();
        for idx in 0..4 {
            store.upsert_chunk(&chunk("a.ts", idx, None)).await.unwrap();
        }
        let deleted = store.delete_chunks_beyond("acme/shop", "a.ts", 1).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count_chunks("acme/shop").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn global_delete_keeps_only_seen_paths() {
        let store = InMemoryChunkStore::new();
        store.upsert_chunk(&chunk("a.ts", 0, None)).await.unwrap();
        store.upsert_chunk(&chunk("b.ts", 0, None)).await.unwrap();
        let keep: HashSet<String> = ["b.ts".to_string()].into_iter().collect();
        store.delete_paths_not_in("acme/shop", &keep).await.unwrap();
        assert_eq!(store.paths_for("acme/shop"), keep);
    }

    #[tokio::test]
    async fn similarity_orders_by_score() {
        let store = InMemoryChunkStore::new();
        store
            .upsert_chunk(&chunk("a.ts", 0, Some(vec![1.0, 0.0])))
            .await
            .unwrap();
        store
            .upsert_chunk(&chunk("b.ts", 0, Some(vec![0.0, 1.0])))
            .await
            .unwrap();
        let hits = store
            .similarity_search("acme/shop", &[1.0, 0.1], 10, 0.5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "a.ts");
    }
}
