//! The auto-fix engine: proposal validation, workspace staging, sandbox
//! validation, and the git branch / pull-request lifecycle.

mod engine;
mod validate;
mod workspace;

pub use engine::{run_auto_fix, AutoFixDeps};
pub use validate::{
    anchor_lines, extract_touched_paths, is_denylisted, strip_non_diff_lines, validate_diff,
    validate_rewrite, DiffIssue, RewriteIssue, DENYLIST, MAX_DIFF_BYTES, MAX_REWRITE_FILE_BYTES,
};
pub use workspace::{
    apply_diff_with_retry, apply_rewrite, stage_workspace, StagedWorkspace, WorkspaceError,
};
