use crate::validate::{
    extract_touched_paths, is_denylisted, validate_diff, validate_rewrite, DiffIssue,
};
use crate::workspace::{apply_diff_with_retry, apply_rewrite, stage_workspace, StagedWorkspace};
use anyhow::{anyhow, Context};
use common::AgentConfig;
use domain::{FailReason, FixOutcome, FixProposal, Incident, IncidentSummary};
use embeddings::Embedder;
use llm::{propose_diff, propose_rewrite, LlmClient};
use memory::ChunkStore;
use rag::{retrieve, RepoCache};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tools::{ForgeClient, GitRunner, Mount, SandboxResult, SandboxRunner, SandboxSpec};
use tracing::{error, info, warn};

/// Container-side mount point for the staged repo copy.
const CONTAINER_REPO: &str = "/workspace/repo";

/// Install and test both run under this deadline.
const SANDBOX_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Bytes of sandbox output quoted in the pull-request body.
const PR_OUTPUT_TAIL: usize = 4 * 1024;

/// Everything the engine needs, threaded in explicitly so every seam is
/// mockable.
pub struct AutoFixDeps {
    pub config: AgentConfig,
    pub store: Arc<dyn ChunkStore>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub llm: Option<LlmClient>,
    pub git: Arc<dyn GitRunner>,
    pub sandbox: Arc<dyn SandboxRunner>,
    pub forge: Arc<dyn ForgeClient>,
}

/// Run the full auto-fix pipeline for one incident whose issue is already
/// open. Never panics and never returns an error: every failure mode maps to
/// a structured [`FixOutcome`], with an explanatory comment left on the
/// issue whenever the pipeline got far enough to have something to say.
pub async fn run_auto_fix(
    deps: &AutoFixDeps,
    incident: &Incident,
    summary: Option<&IncidentSummary>,
    issue_number: u64,
) -> FixOutcome {
    let auto_fix = &deps.config.auto_fix;
    if !auto_fix.enabled {
        return FixOutcome::skipped("auto-fix is disabled");
    }
    if !auto_fix.severity_floor.admits(incident.severity) {
        return FixOutcome::skipped(format!(
            "severity {} is below the auto-fix floor",
            incident.severity
        ));
    }
    if deps.llm.is_none() {
        return FixOutcome::skipped("no llm provider configured");
    }
    if auto_fix.test_command.is_none() {
        // A fix is only proposed after a green sandbox run; without a test
        // command there is nothing to validate against.
        return FixOutcome::skipped("AUTO_FIX_TEST_COMMAND is not configured");
    }

    match pipeline(deps, incident, summary, issue_number).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(incident = %incident.id, error = %err, "auto-fix aborted unexpectedly");
            comment(
                deps,
                issue_number,
                &format!("Auto-fix aborted unexpectedly: {err}"),
            )
            .await;
            FixOutcome::failed(FailReason::UnexpectedError, err.to_string())
        }
    }
}

enum Selection {
    Proposal(FixProposal),
    Terminal(FixOutcome),
}

async fn pipeline(
    deps: &AutoFixDeps,
    incident: &Incident,
    summary: Option<&IncidentSummary>,
    issue_number: u64,
) -> anyhow::Result<FixOutcome> {
    // 1. Resolve the clone the fix is developed against.
    let repo_path = match resolve_repo(deps).await? {
        Ok(path) => path,
        Err(outcome) => return Ok(outcome),
    };
    let repo_key = deps
        .config
        .repo
        .as_ref()
        .map(|t| t.repo_key())
        .unwrap_or_else(|| "local".to_string());

    // 2. Retrieval context for the synthesizer.
    let query = retrieval_query(incident, summary);
    let chunks = retrieve(
        deps.store.as_ref(),
        deps.embedder.as_deref(),
        &repo_key,
        &query,
        deps.config.rag.top_k,
        deps.config.rag.min_score,
    )
    .await?;
    info!(incident = %incident.id, chunks = chunks.len(), "retrieved fix context");

    // 3 + 4. Strict diff first, whole-file rewrite as the fallback.
    let proposal = match select_proposal(deps, incident, summary, &chunks, &repo_path, issue_number)
        .await?
    {
        Selection::Proposal(proposal) => proposal,
        Selection::Terminal(outcome) => return Ok(outcome),
    };

    // 5. Safety gate over the combined touched set.
    let touched = touched_paths(&proposal);
    if let Some(bad) = touched.iter().find(|path| is_denylisted(path)) {
        comment(
            deps,
            issue_number,
            &format!("Auto-fix refused: proposal touches protected path `{bad}`"),
        )
        .await;
        return Ok(FixOutcome::failed(FailReason::UnsafeFiles, bad.clone()));
    }

    // 6 onwards run against a staged copy; the workspace is disposable and
    // cleaned up whatever the outcome.
    let ws = stage_workspace(&repo_path)?;
    let outcome = staged_phase(
        deps,
        incident,
        summary,
        &chunks,
        &repo_path,
        &ws,
        proposal,
        issue_number,
    )
    .await;
    ws.cleanup();
    outcome
}

/// Prefer the explicit local clone, else ensure the managed cache.
async fn resolve_repo(deps: &AutoFixDeps) -> anyhow::Result<Result<PathBuf, FixOutcome>> {
    if let Some(path) = &deps.config.auto_fix.repo_path {
        return Ok(Ok(PathBuf::from(path)));
    }
    let Some(target) = &deps.config.repo else {
        return Ok(Err(FixOutcome::skipped("no repository target configured")));
    };
    let cache = RepoCache::new(deps.git.clone(), &deps.config.rag.cache_dir);
    let path = cache
        .ensure(
            target,
            deps.config.github_token.as_deref(),
            &deps.config.default_branch,
            deps.config.rag.refresh,
        )
        .await
        .context("repo cache refresh failed")?;
    Ok(Ok(path))
}

fn retrieval_query(incident: &Incident, summary: Option<&IncidentSummary>) -> String {
    let mut query = incident.title.clone();
    if let Some(summary) = summary {
        query.push('\n');
        query.push_str(&summary.summary);
    }
    for line in &incident.evidence {
        query.push('\n');
        query.push_str(line);
    }
    query
}

fn touched_paths(proposal: &FixProposal) -> Vec<String> {
    match proposal {
        FixProposal::Diff { diff, .. } => extract_touched_paths(diff),
        FixProposal::Rewrite { files, .. } => files.iter().map(|f| f.path.clone()).collect(),
    }
}

async fn select_proposal(
    deps: &AutoFixDeps,
    incident: &Incident,
    summary: Option<&IncidentSummary>,
    chunks: &[domain::RetrievedChunk],
    repo_path: &Path,
    issue_number: u64,
) -> anyhow::Result<Selection> {
    let llm = deps.llm.as_ref();

    if let Some(proposal) = propose_diff(llm, incident, summary, chunks, true).await {
        if let FixProposal::Diff { diff, .. } = &proposal {
            match validate_diff(diff) {
                Ok(_) => return Ok(Selection::Proposal(proposal)),
                Err(DiffIssue::TooLarge { bytes }) => {
                    comment(
                        deps,
                        issue_number,
                        &format!("Auto-fix failed: diff too large ({bytes} bytes)"),
                    )
                    .await;
                    return Ok(Selection::Terminal(FixOutcome::failed(
                        FailReason::DiffTooLarge,
                        format!("diff is {bytes} bytes"),
                    )));
                }
                Err(DiffIssue::Malformed { reason }) => {
                    warn!(incident = %incident.id, reason, "discarding malformed diff proposal");
                }
            }
        }
    }

    let Some(proposal) = propose_rewrite(llm, incident, summary, chunks).await else {
        comment(
            deps,
            issue_number,
            "Auto-fix failed: rewrite validation failed (no valid proposal was produced)",
        )
        .await;
        return Ok(Selection::Terminal(FixOutcome::failed(
            FailReason::RewriteInvalid,
            "no valid rewrite proposal",
        )));
    };

    if let FixProposal::Rewrite { files, .. } = &proposal {
        for file in files {
            let existing = std::fs::read_to_string(repo_path.join(&file.path)).ok();
            if let Err(issue) = validate_rewrite(file, existing.as_deref()) {
                comment(
                    deps,
                    issue_number,
                    &format!("Auto-fix failed: rewrite validation failed: {issue}"),
                )
                .await;
                return Ok(Selection::Terminal(FixOutcome::failed(
                    FailReason::RewriteInvalid,
                    issue.to_string(),
                )));
            }
        }
    }

    Ok(Selection::Proposal(proposal))
}

#[allow(clippy::too_many_arguments)]
async fn staged_phase(
    deps: &AutoFixDeps,
    incident: &Incident,
    summary: Option<&IncidentSummary>,
    chunks: &[domain::RetrievedChunk],
    repo_path: &Path,
    ws: &StagedWorkspace,
    mut proposal: FixProposal,
    issue_number: u64,
) -> anyhow::Result<FixOutcome> {
    // 6. Apply the proposal to the staged copy; a failing patch gets one
    // regeneration as a rewrite before the attempt is abandoned.
    let diff_text = match &proposal {
        FixProposal::Diff { diff, .. } => Some(diff.clone()),
        FixProposal::Rewrite { .. } => None,
    };
    if let Some(diff) = diff_text {
        if apply_diff_with_retry(deps.git.as_ref(), &ws.repo, &ws.root, &diff)
            .await
            .is_err()
        {
            warn!(incident = %incident.id, "patch failed to apply, regenerating as rewrite");
            match regenerate_rewrite(deps, incident, summary, chunks, repo_path).await {
                Some(rewrite) => {
                    if let FixProposal::Rewrite { files, .. } = &rewrite {
                        apply_rewrite(&ws.repo, files)?;
                    }
                    proposal = rewrite;
                }
                None => {
                    comment(
                        deps,
                        issue_number,
                        "Auto-fix failed: the generated diff did not apply and no valid rewrite fallback was produced",
                    )
                    .await;
                    return Ok(FixOutcome::failed(
                        FailReason::InvalidDiff,
                        "patch did not apply and rewrite fallback failed",
                    ));
                }
            }
        }
    } else if let FixProposal::Rewrite { files, .. } = &proposal {
        apply_rewrite(&ws.repo, files)?;
    }

    // 7. Optional dependency install inside the sandbox.
    if ws.repo.join("package.json").exists() {
        if let Some(install) = &deps.config.auto_fix.install_command {
            let result = run_in_sandbox(deps, ws, install).await?;
            if result.exit_code != 0 {
                comment(
                    deps,
                    issue_number,
                    &format!(
                        "Auto-fix failed: dependency install exited with {}:\n```\n{}\n```",
                        result.exit_code,
                        result.tail(PR_OUTPUT_TAIL)
                    ),
                )
                .await;
                return Ok(FixOutcome::failed(
                    FailReason::SandboxInstallFailed,
                    format!("install exited with {}", result.exit_code),
                ));
            }
        }
    }

    // 8. Sandbox test run; gated earlier so the command is present.
    let test_command = deps
        .config
        .auto_fix
        .test_command
        .clone()
        .ok_or_else(|| anyhow!("test command vanished after gating"))?;
    let test_result = run_in_sandbox(deps, ws, &test_command).await?;
    if test_result.exit_code != 0 {
        comment(
            deps,
            issue_number,
            &format!(
                "Auto-fix failed: sandbox validation exited with {}:\n```\n{}\n```",
                test_result.exit_code,
                test_result.tail(PR_OUTPUT_TAIL)
            ),
        )
        .await;
        return Ok(FixOutcome::failed(
            FailReason::SandboxValidationFailed,
            format!("tests exited with {}", test_result.exit_code),
        ));
    }
    info!(incident = %incident.id, "sandbox validation green");

    // 9. Promote into the real clone.
    let git = deps.git.as_ref();
    let status = git.run(Some(repo_path), &["status", "--porcelain"]).await?;
    if !status.is_empty() {
        comment(
            deps,
            issue_number,
            "Auto-fix failed: target clone has uncommitted changes",
        )
        .await;
        return Ok(FixOutcome::failed(
            FailReason::DirtyRepo,
            "working tree is not clean",
        ));
    }

    let base = deps.config.default_branch.clone();
    git.run(Some(repo_path), &["checkout", &base]).await?;

    match &proposal {
        FixProposal::Diff { diff, .. } => {
            apply_diff_with_retry(git, repo_path, &ws.root, diff).await?;
        }
        FixProposal::Rewrite { files, .. } => {
            apply_rewrite(repo_path, files)?;
        }
    }

    let branch = format!("{}/{}", deps.config.auto_fix.branch_prefix, incident.id);
    git.run(Some(repo_path), &["checkout", "-b", &branch]).await?;

    let (user_name, user_email) = deps
        .config
        .git_identity()
        .ok_or_else(|| anyhow!("no git identity configured and no repo owner to derive one"))?;
    git.run(Some(repo_path), &["config", "user.name", &user_name])
        .await?;
    git.run(Some(repo_path), &["config", "user.email", &user_email])
        .await?;
    git.run(Some(repo_path), &["add", "-A"]).await?;
    let message = format!("fix: {}", incident.title);
    git.run(Some(repo_path), &["commit", "-m", &message]).await?;
    git.run(Some(repo_path), &["push", "-u", "origin", &branch])
        .await?;

    // 10. Pull request.
    let body = compose_pr_body(repo_path, &proposal, &test_result, issue_number);
    let title = format!("fix: {}", incident.title);
    match deps
        .forge
        .create_pull_request(&title, &branch, &base, &body)
        .await
    {
        Ok(pr) => {
            if let Err(err) = deps.forge.add_labels(pr.number, &["autofix".to_string()]).await {
                warn!(pr = pr.number, error = %err, "failed to label pull request");
            }
            // 11. Close the loop on the originating issue.
            comment(
                deps,
                issue_number,
                &format!("Auto-fix opened a pull request: {}", pr.url),
            )
            .await;
            info!(incident = %incident.id, pr = pr.number, "auto-fix submitted");
            Ok(FixOutcome::Submitted {
                pr_url: pr.url,
                branch,
            })
        }
        Err(err) => {
            comment(
                deps,
                issue_number,
                &format!("Auto-fix failed: pull request creation was rejected: {err}"),
            )
            .await;
            Ok(FixOutcome::failed(FailReason::PrCreateFailed, err.to_string()))
        }
    }
}

async fn regenerate_rewrite(
    deps: &AutoFixDeps,
    incident: &Incident,
    summary: Option<&IncidentSummary>,
    chunks: &[domain::RetrievedChunk],
    repo_path: &Path,
) -> Option<FixProposal> {
    let proposal = propose_rewrite(deps.llm.as_ref(), incident, summary, chunks).await?;
    if let FixProposal::Rewrite { files, .. } = &proposal {
        for file in files {
            let existing = std::fs::read_to_string(repo_path.join(&file.path)).ok();
            if validate_rewrite(file, existing.as_deref()).is_err() {
                return None;
            }
        }
        if files.iter().any(|f| is_denylisted(&f.path)) {
            return None;
        }
    }
    Some(proposal)
}

async fn run_in_sandbox(
    deps: &AutoFixDeps,
    ws: &StagedWorkspace,
    command: &str,
) -> anyhow::Result<SandboxResult> {
    let spec = SandboxSpec {
        image: deps.config.auto_fix.sandbox_image.clone(),
        argv: vec!["/bin/sh".to_string(), "-lc".to_string(), command.to_string()],
        workdir: Some(CONTAINER_REPO.to_string()),
        env: Vec::new(),
        mounts: vec![Mount {
            host: ws.repo.to_string_lossy().to_string(),
            container: CONTAINER_REPO.to_string(),
            read_only: false,
        }],
        timeout: SANDBOX_TIMEOUT,
    };
    Ok(deps.sandbox.run(spec).await?)
}

fn compose_pr_body(
    repo_path: &Path,
    proposal: &FixProposal,
    test_result: &SandboxResult,
    issue_number: u64,
) -> String {
    let mut body = String::new();

    let template_path = repo_path.join(".github/PULL_REQUEST_TEMPLATE.md");
    if let Ok(template) = std::fs::read_to_string(&template_path) {
        body.push_str(template.trim_end());
        body.push_str("\n\n");
    }

    body.push_str(&format!("## What changed\n\n{}\n\n", proposal.summary()));
    body.push_str(&format!("## Why\n\n{}\n\n", proposal.reason()));
    body.push_str("## Test plan\n\n");
    for step in proposal.test_plan() {
        body.push_str(&format!("- {step}\n"));
    }
    body.push_str(&format!(
        "\n```\n{}\n```\n\n",
        test_result.tail(PR_OUTPUT_TAIL)
    ));

    let path_taken = match proposal {
        FixProposal::Diff { .. } => "unified diff applied with `git apply`",
        FixProposal::Rewrite { .. } => "whole-file rewrite",
    };
    body.push_str(&format!(
        "## Safety checks\n\n\
         - no denylisted paths touched ({})\n\
         - validated in a network-isolated sandbox (exit code {})\n\
         - change shape: {}\n\n",
        crate::validate::DENYLIST.join(", "),
        test_result.exit_code,
        path_taken
    ));

    body.push_str(&format!("Closes #{issue_number}\n"));
    body
}

/// Best-effort issue comment; a forge failure here is logged, never fatal.
async fn comment(deps: &AutoFixDeps, issue_number: u64, body: &str) {
    if let Err(err) = deps.forge.create_comment(issue_number, body).await {
        warn!(issue = issue_number, error = %err, "failed to post issue comment");
    }
}
