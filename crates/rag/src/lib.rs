//! Retrieval-augmented context over the target repository: a managed shallow
//! clone, an incremental chunk-level indexer, and the similarity retriever.

mod cache;
mod chunker;
mod indexer;
mod retriever;
mod walker;

pub use cache::{clone_url, head_sha, RepoCache, RepoCacheError};
pub use chunker::{chunk_text, hash_content};
pub use indexer::{index_repo, IndexError, IndexStats};
pub use retriever::retrieve;
pub use walker::{walk_text_files, WalkedFile, EXCLUDED_DIRS, EXCLUDED_EXTENSIONS, MAX_FILE_BYTES};
