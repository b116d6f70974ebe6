use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a chunk's content, the staleness key the indexer
/// compares before re-embedding.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Slice `text` into overlapping windows of at most `chunk_size` characters,
/// each window starting `chunk_size - overlap` characters after the last.
/// Chunking stops once a window reaches the end of the text, so the final
/// chunk always ends at the last character.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);
    let step = chunk_size - overlap;

    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if n <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(n);
        chunks.push(chars[start..end].iter().collect());
        if end >= n {
            break;
        }
        start += step;
    }
    chunks
}
