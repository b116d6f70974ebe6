use std::fs;
use std::path::Path;
use tracing::debug;

/// Directory names never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "dist",
    "build",
    "coverage",
    ".cursor",
    ".next",
    ".turbo",
    "logs",
];

/// Extensions treated as non-text regardless of content.
pub const EXCLUDED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "ico", "pdf", "zip", "tar", "gz", "lock",
];

/// Files larger than this are skipped outright.
pub const MAX_FILE_BYTES: u64 = 300 * 1024;

/// Bytes sniffed for a NUL to classify a file as binary.
const SNIFF_BYTES: usize = 1024;

#[derive(Debug, Clone)]
pub struct WalkedFile {
    /// Forward-slash path relative to the walk root.
    pub path: String,
    pub content: String,
}

/// Collect every indexable text file under `root`, applying the fixed
/// exclusion rules. Paths come back sorted for deterministic indexing order.
pub fn walk_text_files(root: &Path) -> std::io::Result<Vec<WalkedFile>> {
    let mut files = Vec::new();
    walk_dir(root, root, &mut files)?;
    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(count = files.len(), root = %root.display(), "walked repository tree");
    Ok(files)
}

fn walk_dir(root: &Path, dir: &Path, out: &mut Vec<WalkedFile>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if path.is_dir() {
            if EXCLUDED_DIRS.contains(&name.as_str()) {
                continue;
            }
            walk_dir(root, &path, out)?;
            continue;
        }
        if !path.is_file() {
            continue;
        }

        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if EXCLUDED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                continue;
            }
        }

        let metadata = entry.metadata()?;
        if metadata.len() > MAX_FILE_BYTES {
            continue;
        }

        let bytes = fs::read(&path)?;
        if bytes[..bytes.len().min(SNIFF_BYTES)].contains(&0) {
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        out.push(WalkedFile {
            path: relative,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }
    Ok(())
}
