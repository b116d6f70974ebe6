use serde::{Deserialize, Serialize};
use std::fmt;

/// Full replacement contents for a single file in a rewrite proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteFile {
    pub path: String,
    pub content: String,
}

/// A candidate code change produced by the fix synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FixProposal {
    /// Unified diff applicable with `git apply`.
    Diff {
        summary: String,
        reason: String,
        test_plan: Vec<String>,
        diff: String,
    },
    /// Whole-file replacements, used when patching is not viable.
    Rewrite {
        summary: String,
        reason: String,
        test_plan: Vec<String>,
        files: Vec<RewriteFile>,
    },
}

impl FixProposal {
    pub fn summary(&self) -> &str {
        match self {
            Self::Diff { summary, .. } | Self::Rewrite { summary, .. } => summary,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Diff { reason, .. } | Self::Rewrite { reason, .. } => reason,
        }
    }

    pub fn test_plan(&self) -> &[String] {
        match self {
            Self::Diff { test_plan, .. } | Self::Rewrite { test_plan, .. } => test_plan,
        }
    }
}

/// Structured failure category reported by the auto-fix engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    DiffTooLarge,
    RewriteInvalid,
    UnsafeFiles,
    InvalidDiff,
    SandboxInstallFailed,
    SandboxValidationFailed,
    DirtyRepo,
    PrCreateFailed,
    UnexpectedError,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DiffTooLarge => "diff_too_large",
            Self::RewriteInvalid => "rewrite_invalid",
            Self::UnsafeFiles => "unsafe_files",
            Self::InvalidDiff => "invalid_diff",
            Self::SandboxInstallFailed => "sandbox_install_failed",
            Self::SandboxValidationFailed => "sandbox_validation_failed",
            Self::DirtyRepo => "dirty_repo",
            Self::PrCreateFailed => "pr_create_failed",
            Self::UnexpectedError => "unexpected_error",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of one auto-fix attempt for one incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FixOutcome {
    /// Gating declined to run (disabled, below floor, missing config).
    Skipped { reason: String },
    /// The pipeline ran and stopped at a structured failure point.
    Failed { reason: FailReason, detail: String },
    /// A pull request was opened.
    Submitted { pr_url: String, branch: String },
}

impl FixOutcome {
    pub fn failed(reason: FailReason, detail: impl Into<String>) -> Self {
        Self::Failed {
            reason,
            detail: detail.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}
