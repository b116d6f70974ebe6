use crate::store::StoreError;
use sqlx::PgPool;
use tracing::{info, warn};

/// Dimension limit above which pgvector's IVFFLAT index cannot be built.
const IVFFLAT_MAX_DIM: usize = 2000;

/// Create the three tables and the cosine index. Idempotent; called once on
/// first pool use.
pub async fn ensure_schema(pool: &PgPool, dimension: usize) -> Result<(), StoreError> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS repo_embeddings (
            id TEXT PRIMARY KEY,
            repo_key TEXT NOT NULL,
            path TEXT NOT NULL,
            chunk_index INT NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            embedding VECTOR({dimension}) NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (repo_key, path, chunk_index)
        )"
    ))
    .execute(pool)
    .await?;

    if dimension <= IVFFLAT_MAX_DIM {
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS repo_embeddings_embedding_idx
             ON repo_embeddings USING ivfflat (embedding vector_cosine_ops)",
        )
        .execute(pool)
        .await?;
    } else {
        warn!(
            dimension,
            limit = IVFFLAT_MAX_DIM,
            "embedding dimension exceeds IVFFLAT limit, skipping index creation"
        );
    }

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS repo_index_state (
            repo_key TEXT PRIMARY KEY,
            head_sha TEXT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS incident_memory (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            severity TEXT NOT NULL,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL,
            event_count BIGINT NOT NULL,
            evidence JSONB NOT NULL,
            embedding VECTOR(1536) NULL
        )",
    )
    .execute(pool)
    .await?;

    info!(dimension, "database schema ready");
    Ok(())
}
