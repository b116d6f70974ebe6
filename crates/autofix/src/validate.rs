use domain::RewriteFile;

/// Hard ceiling on a generated unified diff.
pub const MAX_DIFF_BYTES: usize = 200_000;

/// Hard ceiling on a single rewritten file.
pub const MAX_REWRITE_FILE_BYTES: usize = 500_000;

/// Path substrings the engine refuses to touch.
pub const DENYLIST: &[&str] = &[".env", ".env.local", "secrets", "credentials"];

/// Minimum non-blank line count before the anchor rule applies to an
/// existing file.
const ANCHOR_MIN_LINES: usize = 20;

/// A rewrite must retain at least this fraction of the original length.
const MIN_REWRITE_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffIssue {
    /// Over the byte ceiling; terminal for the diff path.
    TooLarge { bytes: usize },
    /// Missing unified-diff markers or no extractable file; the engine falls
    /// through to the rewrite path.
    Malformed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteIssue {
    FileTooLarge { path: String, bytes: usize },
    DenylistedPath { path: String },
    AnchorMismatch { path: String },
    TooShort { path: String },
}

impl std::fmt::Display for RewriteIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileTooLarge { path, bytes } => {
                write!(f, "{path}: rewrite is {bytes} bytes, over the limit")
            }
            Self::DenylistedPath { path } => write!(f, "{path}: path is denylisted"),
            Self::AnchorMismatch { path } => {
                write!(f, "{path}: rewrite shares no anchor line with the existing file")
            }
            Self::TooShort { path } => {
                write!(f, "{path}: rewrite is less than half the original length")
            }
        }
    }
}

/// Whether a repo-relative path contains any denylisted segment.
pub fn is_denylisted(path: &str) -> bool {
    let lowered = path.to_ascii_lowercase();
    DENYLIST.iter().any(|entry| lowered.contains(entry))
}

/// Extract the set of files a unified diff touches, from `diff --git`
/// headers and `--- a/` lines. `/dev/null` sides are ignored.
pub fn extract_touched_paths(diff: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git a/") {
            if let Some((_, b_side)) = rest.split_once(" b/") {
                push_unique(&mut paths, b_side.trim());
            }
        } else if let Some(path) = line.strip_prefix("--- a/") {
            push_unique(&mut paths, path.trim());
        } else if let Some(path) = line.strip_prefix("+++ b/") {
            push_unique(&mut paths, path.trim());
        }
    }
    paths
}

fn push_unique(paths: &mut Vec<String>, path: &str) {
    if path.is_empty() || path == "/dev/null" {
        return;
    }
    if !paths.iter().any(|p| p == path) {
        paths.push(path.to_string());
    }
}

/// Structural validation of a strict unified diff. Returns the touched
/// paths on success.
pub fn validate_diff(diff: &str) -> Result<Vec<String>, DiffIssue> {
    if diff.len() > MAX_DIFF_BYTES {
        return Err(DiffIssue::TooLarge { bytes: diff.len() });
    }
    if !(diff.contains("--- a/") && diff.contains("+++ b/") && diff.contains("@@")) {
        return Err(DiffIssue::Malformed {
            reason: "missing unified diff markers".into(),
        });
    }
    let paths = extract_touched_paths(diff);
    if paths.is_empty() {
        return Err(DiffIssue::Malformed {
            reason: "no touched file could be extracted".into(),
        });
    }
    Ok(paths)
}

/// First three and last three non-blank trimmed lines of a file, the
/// verbatim anchors a rewrite of it must retain at least one of.
pub fn anchor_lines(content: &str) -> Vec<String> {
    let non_blank: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if non_blank.len() < ANCHOR_MIN_LINES {
        return Vec::new();
    }
    let mut anchors: Vec<String> = non_blank[..3].iter().map(|s| s.to_string()).collect();
    for line in &non_blank[non_blank.len() - 3..] {
        let line = line.to_string();
        if !anchors.contains(&line) {
            anchors.push(line);
        }
    }
    anchors
}

/// Validate one rewrite file against the existing content at its path
/// (`None` for a new file). Checks run in severity order: size cap,
/// denylist, anchors, shrink ratio.
pub fn validate_rewrite(file: &RewriteFile, existing: Option<&str>) -> Result<(), RewriteIssue> {
    if file.content.len() > MAX_REWRITE_FILE_BYTES {
        return Err(RewriteIssue::FileTooLarge {
            path: file.path.clone(),
            bytes: file.content.len(),
        });
    }
    if is_denylisted(&file.path) {
        return Err(RewriteIssue::DenylistedPath {
            path: file.path.clone(),
        });
    }

    if let Some(existing) = existing {
        let anchors = anchor_lines(existing);
        if !anchors.is_empty() && !anchors.iter().any(|anchor| file.content.contains(anchor)) {
            return Err(RewriteIssue::AnchorMismatch {
                path: file.path.clone(),
            });
        }
        if (file.content.len() as f64) < existing.len() as f64 * MIN_REWRITE_RATIO {
            return Err(RewriteIssue::TooShort {
                path: file.path.clone(),
            });
        }
    }

    Ok(())
}

/// Keep only lines a unified diff may legally contain. Used as the one-shot
/// repair before retrying `git apply` on a proposal that carried stray prose.
pub fn strip_non_diff_lines(diff: &str) -> String {
    diff.lines()
        .filter(|line| {
            line.is_empty()
                || line.starts_with("diff ")
                || line.starts_with("index ")
                || line.starts_with("--- ")
                || line.starts_with("+++ ")
                || line.starts_with("@@")
                || line.starts_with('+')
                || line.starts_with('-')
                || line.starts_with(' ')
                || line.starts_with('\\')
        })
        .collect::<Vec<_>>()
        .join("\n")
}
