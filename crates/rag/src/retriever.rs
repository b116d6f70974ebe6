use domain::RetrievedChunk;
use embeddings::Embedder;
use memory::{ChunkStore, StoreError};
use tracing::{debug, warn};

/// Embed `query` and return the top-k chunks for `repo_key` at or above the
/// similarity floor, ordered by the store's ascending-distance ranking. No
/// embedder (or an embedding failure) yields an empty result, never an error:
/// the fix synthesizer simply runs without repository context.
pub async fn retrieve(
    store: &dyn ChunkStore,
    embedder: Option<&dyn Embedder>,
    repo_key: &str,
    query: &str,
    top_k: usize,
    min_score: f64,
) -> Result<Vec<RetrievedChunk>, StoreError> {
    let Some(embedder) = embedder else {
        debug!(repo_key, "no embedder configured, skipping retrieval");
        return Ok(Vec::new());
    };

    let vector = match embedder.embed(query).await {
        Ok(vector) => vector,
        Err(err) => {
            warn!(repo_key, error = %err, "query embedding failed, skipping retrieval");
            return Ok(Vec::new());
        }
    };

    let hits = store
        .similarity_search(repo_key, &vector, top_k, min_score)
        .await?;
    debug!(repo_key, hits = hits.len(), top_k, "retrieval complete");
    Ok(hits)
}
