//! Persistent state: the pgvector-backed chunk store, the repo index state,
//! and incident memory. The pool is created lazily and shared; everything
//! the indexer and retriever need goes through the [`ChunkStore`] seam so
//! tests can substitute an in-memory implementation.

mod mock;
mod schema;
mod store;
mod vector;

pub use mock::InMemoryChunkStore;
pub use store::{ChunkStore, Store, StoreError};
pub use vector::vector_literal;
