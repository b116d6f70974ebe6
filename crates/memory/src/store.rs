use crate::schema::ensure_schema;
use crate::vector::vector_literal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Incident, RepoChunk, RepoIndexState, RetrievedChunk};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Seam between the indexer/retriever and the persistence layer.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// `chunk_index -> content_hash` for every row of one path.
    async fn chunk_hashes(
        &self,
        repo_key: &str,
        path: &str,
    ) -> Result<HashMap<u32, String>, StoreError>;

    async fn upsert_chunk(&self, chunk: &RepoChunk) -> Result<(), StoreError>;

    /// Drop rows of `path` whose index exceeds `last_index`.
    async fn delete_chunks_beyond(
        &self,
        repo_key: &str,
        path: &str,
        last_index: u32,
    ) -> Result<u64, StoreError>;

    /// Drop every row under `repo_key` whose path was not seen this run.
    async fn delete_paths_not_in(
        &self,
        repo_key: &str,
        keep: &HashSet<String>,
    ) -> Result<u64, StoreError>;

    async fn count_chunks(&self, repo_key: &str) -> Result<i64, StoreError>;

    async fn similarity_search(
        &self,
        repo_key: &str,
        query: &[f32],
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<RetrievedChunk>, StoreError>;

    async fn index_state(&self, repo_key: &str) -> Result<Option<RepoIndexState>, StoreError>;

    async fn set_index_state(&self, repo_key: &str, head_sha: &str) -> Result<(), StoreError>;
}

/// Postgres-backed store. Cheap to clone; the pool is shared.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect and bootstrap the schema. The pool is the process-wide handle;
    /// callers create it once (lazily) and thread it through the context.
    pub async fn connect(dsn: &str, embedding_dim: usize) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(dsn)
            .await?;
        ensure_schema(&pool, embedding_dim).await?;
        info!("connected to postgres store");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Persist this run's incidents. Evidence is stored as JSONB; the
    /// embedding is optional and present only when a vectoriser ran.
    pub async fn persist_incidents(
        &self,
        incidents: &[Incident],
        embeddings: &HashMap<uuid::Uuid, Vec<f32>>,
    ) -> Result<(), StoreError> {
        for incident in incidents {
            let embedding = embeddings.get(&incident.id).map(|v| vector_literal(v));
            sqlx::query(
                "INSERT INTO incident_memory
                 (id, title, severity, first_seen, last_seen, event_count, evidence, embedding)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8::vector)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(incident.id.to_string())
            .bind(&incident.title)
            .bind(incident.severity.to_string())
            .bind(&incident.first_seen)
            .bind(&incident.last_seen)
            .bind(incident.count as i64)
            .bind(serde_json::to_value(&incident.evidence).unwrap_or_default())
            .bind(embedding)
            .execute(&self.pool)
            .await?;
        }
        debug!(count = incidents.len(), "persisted incidents");
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for Store {
    async fn chunk_hashes(
        &self,
        repo_key: &str,
        path: &str,
    ) -> Result<HashMap<u32, String>, StoreError> {
        let rows = sqlx::query(
            "SELECT chunk_index, content_hash FROM repo_embeddings
             WHERE repo_key = $1 AND path = $2",
        )
        .bind(repo_key)
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let index: i32 = row.get("chunk_index");
                let hash: String = row.get("content_hash");
                (index as u32, hash)
            })
            .collect())
    }

    async fn upsert_chunk(&self, chunk: &RepoChunk) -> Result<(), StoreError> {
        let embedding = chunk.embedding.as_deref().map(vector_literal);
        sqlx::query(
            "INSERT INTO repo_embeddings
             (id, repo_key, path, chunk_index, content, content_hash, embedding, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7::vector, NOW())
             ON CONFLICT (repo_key, path, chunk_index) DO UPDATE SET
                 content = EXCLUDED.content,
                 content_hash = EXCLUDED.content_hash,
                 embedding = EXCLUDED.embedding,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(chunk.row_id())
        .bind(&chunk.repo_key)
        .bind(&chunk.path)
        .bind(chunk.chunk_index as i32)
        .bind(&chunk.content)
        .bind(&chunk.content_hash)
        .bind(embedding)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_chunks_beyond(
        &self,
        repo_key: &str,
        path: &str,
        last_index: u32,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM repo_embeddings
             WHERE repo_key = $1 AND path = $2 AND chunk_index > $3",
        )
        .bind(repo_key)
        .bind(path)
        .bind(last_index as i32)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_paths_not_in(
        &self,
        repo_key: &str,
        keep: &HashSet<String>,
    ) -> Result<u64, StoreError> {
        let keep: Vec<String> = keep.iter().cloned().collect();
        let result = sqlx::query(
            "DELETE FROM repo_embeddings
             WHERE repo_key = $1 AND NOT (path = ANY($2))",
        )
        .bind(repo_key)
        .bind(&keep)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_chunks(&self, repo_key: &str) -> Result<i64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM repo_embeddings WHERE repo_key = $1")
                .bind(repo_key)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn similarity_search(
        &self,
        repo_key: &str,
        query: &[f32],
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let literal = vector_literal(query);
        let rows = sqlx::query(
            "SELECT path, content, (1 - (embedding <-> $2::vector))::float8 AS score
             FROM repo_embeddings
             WHERE repo_key = $1
               AND embedding IS NOT NULL
               AND (1 - (embedding <-> $2::vector)) >= $3
             ORDER BY embedding <-> $2::vector
             LIMIT $4",
        )
        .bind(repo_key)
        .bind(&literal)
        .bind(min_score)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RetrievedChunk {
                path: row.get("path"),
                content: row.get("content"),
                score: row.get("score"),
            })
            .collect())
    }

    async fn index_state(&self, repo_key: &str) -> Result<Option<RepoIndexState>, StoreError> {
        let row = sqlx::query(
            "SELECT head_sha, updated_at FROM repo_index_state WHERE repo_key = $1",
        )
        .bind(repo_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let updated_at: DateTime<Utc> = row.get("updated_at");
            RepoIndexState {
                repo_key: repo_key.to_string(),
                head_sha: row.get("head_sha"),
                updated_at,
            }
        }))
    }

    async fn set_index_state(&self, repo_key: &str, head_sha: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO repo_index_state (repo_key, head_sha, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (repo_key) DO UPDATE SET
                 head_sha = EXCLUDED.head_sha,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(repo_key)
        .bind(head_sha)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
