//! End-to-end engine tests over scripted git/sandbox/forge/LLM seams.

use async_trait::async_trait;
use autofix::{run_auto_fix, AutoFixDeps};
use common::{
    AgentConfig, AutoFixConfig, EmbeddingConfig, LlmConfig, ProviderPreference, RagConfig,
    RefreshPolicy,
};
use domain::{
    AutoFixFloor, EscalationThreshold, FailReason, FixOutcome, Incident, RepoTarget, Severity,
};
use llm::{ChatProvider, ChatRequest, LlmClient, LlmError, ProviderKind};
use memory::InMemoryChunkStore;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tools::{
    ForgeClient, ForgeError, GitError, GitRunner, IssueRef, PullRequestRef, SandboxError,
    SandboxResult, SandboxRunner, SandboxSpec,
};
use uuid::Uuid;

struct CannedChat {
    replies: Mutex<VecDeque<String>>,
}

impl CannedChat {
    fn new<S: Into<String>>(replies: Vec<S>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        })
    }
}

#[async_trait]
impl ChatProvider for CannedChat {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        "canned"
    }

    async fn complete(&self, _request: ChatRequest) -> Result<String, LlmError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyReply)
    }
}

#[derive(Default)]
struct ScriptedGit {
    calls: Mutex<Vec<String>>,
    dirty_status: bool,
}

impl ScriptedGit {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GitRunner for ScriptedGit {
    async fn run(&self, _dir: Option<&Path>, args: &[&str]) -> Result<String, GitError> {
        let joined = args.join(" ");
        self.calls.lock().unwrap().push(joined.clone());
        if args.first() == Some(&"rev-parse") {
            return Ok("abc123".to_string());
        }
        if joined == "status --porcelain" && self.dirty_status {
            return Ok(" M src/app.ts".to_string());
        }
        Ok(String::new())
    }
}

struct FakeSandbox {
    exit_codes: Mutex<VecDeque<i32>>,
}

impl FakeSandbox {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            exit_codes: Mutex::new(VecDeque::new()),
        })
    }

    fn with_exit_codes(codes: Vec<i32>) -> Arc<Self> {
        Arc::new(Self {
            exit_codes: Mutex::new(codes.into()),
        })
    }
}

#[async_trait]
impl SandboxRunner for FakeSandbox {
    async fn run(&self, _spec: SandboxSpec) -> Result<SandboxResult, SandboxError> {
        let exit_code = self.exit_codes.lock().unwrap().pop_front().unwrap_or(0);
        Ok(SandboxResult {
            exit_code,
            output: "1 passing\n".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingForge {
    comments: Mutex<Vec<(u64, String)>>,
    prs: Mutex<Vec<(String, String, String)>>,
    labels: Mutex<Vec<(u64, Vec<String>)>>,
    reject_pr: bool,
}

impl RecordingForge {
    fn comments(&self) -> Vec<(u64, String)> {
        self.comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl ForgeClient for RecordingForge {
    async fn create_issue(
        &self,
        _title: &str,
        _body: &str,
        _labels: &[String],
    ) -> Result<IssueRef, ForgeError> {
        unreachable!("engine never creates issues")
    }

    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<(), ForgeError> {
        self.comments
            .lock()
            .unwrap()
            .push((issue_number, body.to_string()));
        Ok(())
    }

    async fn create_pull_request(
        &self,
        title: &str,
        head: &str,
        _base: &str,
        body: &str,
    ) -> Result<PullRequestRef, ForgeError> {
        if self.reject_pr {
            return Err(ForgeError::Api {
                status: 422,
                body: "Validation Failed".into(),
            });
        }
        self.prs
            .lock()
            .unwrap()
            .push((title.to_string(), head.to_string(), body.to_string()));
        Ok(PullRequestRef {
            number: 9,
            url: "https://github.com/acme/shop/pull/9".into(),
        })
    }

    async fn add_labels(&self, issue_number: u64, labels: &[String]) -> Result<(), ForgeError> {
        self.labels
            .lock()
            .unwrap()
            .push((issue_number, labels.to_vec()));
        Ok(())
    }
}

fn incident() -> Incident {
    Incident {
        id: Uuid::new_v4(),
        key: "error:/api/orders".into(),
        label: "error".into(),
        title: "Incident: error (error:/api/orders)".into(),
        severity: Severity::High,
        evidence: vec!["Simulated error".into()],
        first_seen: "1".into(),
        last_seen: "2".into(),
        count: 4,
    }
}

fn config(repo_path: &Path) -> AgentConfig {
    AgentConfig {
        temporal_address: None,
        loki_url: "http://localhost:3100".into(),
        loki_query: "{app=\"demo\"}".into(),
        postgres_url: None,
        repo: Some(RepoTarget::new("github.com", "acme", "shop")),
        github_token: Some("token".into()),
        default_branch: "main".into(),
        git_user_name: Some("Autofix Bot".into()),
        git_user_email: Some("autofix@example.com".into()),
        llm: LlmConfig {
            preference: ProviderPreference::Auto,
            openai_api_key: None,
            openai_model: "gpt-4o-mini".into(),
            anthropic_api_key: None,
            anthropic_model: "claude-3-5-sonnet-latest".into(),
            gemini_api_key: None,
            gemini_model: "gemini-1.5-flash".into(),
        },
        embedding: EmbeddingConfig {
            preference: ProviderPreference::Auto,
            model: "text-embedding-3-small".into(),
            dimension: 1536,
        },
        rag: RagConfig {
            top_k: 5,
            min_score: 0.15,
            chunk_size: 900,
            chunk_overlap: 150,
            repo_path: None,
            cache_dir: ".repocache".into(),
            refresh: RefreshPolicy::Pull,
        },
        auto_fix: AutoFixConfig {
            enabled: true,
            severity_floor: AutoFixFloor::AtLeast(Severity::High),
            repo_path: Some(repo_path.to_string_lossy().to_string()),
            branch_prefix: "autofix".into(),
            test_command: Some("npm test".into()),
            install_command: None,
            sandbox_image: "node:20-bullseye".into(),
        },
        auto_escalate_from: EscalationThreshold::AtLeast(Severity::High),
        worker_interval_secs: 300,
        lookback_minutes: 5,
        demo_url: None,
    }
}

fn deps_with(
    repo_path: &Path,
    chat: Arc<CannedChat>,
    git: Arc<ScriptedGit>,
    sandbox: Arc<dyn SandboxRunner>,
    forge: Arc<RecordingForge>,
) -> AutoFixDeps {
    AutoFixDeps {
        config: config(repo_path),
        store: Arc::new(InMemoryChunkStore::new()),
        embedder: None,
        llm: Some(LlmClient::from_provider(chat)),
        git,
        sandbox,
        forge,
    }
}

fn repo_fixture() -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    std::fs::create_dir_all(repo.join("src")).unwrap();
    std::fs::write(repo.join("src/app.ts"), "const handler = 1;\n").unwrap();
    (tmp, repo)
}

fn diff_reply(path: &str) -> String {
    format!(
        "{{\"summary\":\"guard against burst\",\"reason\":\"route crashes\",\"testPlan\":[\"npm test\"],\
         \"diff\":\"diff --git a/{path} b/{path}\\n--- a/{path}\\n+++ b/{path}\\n@@ -1 +1 @@\\n-old\\n+new\\n\"}}"
    )
}

#[tokio::test]
async fn disabled_engine_reports_skipped() {
    let (_tmp, repo) = repo_fixture();
    let git = Arc::new(ScriptedGit::default());
    let forge = Arc::new(RecordingForge::default());
    let mut deps = deps_with(&repo, CannedChat::new(Vec::<String>::new()), git, FakeSandbox::ok(), forge);
    deps.config.auto_fix.enabled = false;

    let outcome = run_auto_fix(&deps, &incident(), None, 5).await;
    assert!(matches!(outcome, FixOutcome::Skipped { .. }));
}

#[tokio::test]
async fn below_severity_floor_is_skipped() {
    let (_tmp, repo) = repo_fixture();
    let git = Arc::new(ScriptedGit::default());
    let forge = Arc::new(RecordingForge::default());
    let deps = deps_with(&repo, CannedChat::new(Vec::<String>::new()), git, FakeSandbox::ok(), forge);

    let mut low = incident();
    low.severity = Severity::Medium;
    let outcome = run_auto_fix(&deps, &low, None, 5).await;
    match outcome {
        FixOutcome::Skipped { reason } => assert!(reason.contains("below")),
        other => panic!("expected skipped, got {other:?}"),
    }
}

#[tokio::test]
async fn denylisted_diff_aborts_without_branching() {
    let (_tmp, repo) = repo_fixture();
    let git = Arc::new(ScriptedGit::default());
    let forge = Arc::new(RecordingForge::default());
    let chat = CannedChat::new(vec![diff_reply(".env")]);
    let deps = deps_with(&repo, chat, git.clone(), FakeSandbox::ok(), forge.clone());

    let outcome = run_auto_fix(&deps, &incident(), None, 5).await;
    match outcome {
        FixOutcome::Failed { reason, .. } => assert_eq!(reason, FailReason::UnsafeFiles),
        other => panic!("expected unsafe_files, got {other:?}"),
    }

    let comments = forge.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].1.contains(".env"));
    assert!(
        !git.calls().iter().any(|c| c.contains("checkout -b")),
        "no branch may be created for an unsafe proposal"
    );
}

#[tokio::test]
async fn oversized_diff_is_terminal() {
    let (_tmp, repo) = repo_fixture();
    let git = Arc::new(ScriptedGit::default());
    let forge = Arc::new(RecordingForge::default());
    let huge = "x".repeat(200_001);
    let reply = format!(
        "{{\"summary\":\"s\",\"reason\":\"r\",\"testPlan\":[\"t\"],\"diff\":\"--- a/f\\n+++ b/f\\n@@\\n{huge}\"}}"
    );
    let chat = CannedChat::new(vec![reply]);
    let deps = deps_with(&repo, chat, git, FakeSandbox::ok(), forge.clone());

    let outcome = run_auto_fix(&deps, &incident(), None, 5).await;
    match outcome {
        FixOutcome::Failed { reason, .. } => assert_eq!(reason, FailReason::DiffTooLarge),
        other => panic!("expected diff_too_large, got {other:?}"),
    }
    assert!(forge.comments()[0].1.contains("diff too large"));
}

#[tokio::test]
async fn green_pipeline_opens_pull_request() {
    let (_tmp, repo) = repo_fixture();
    let git = Arc::new(ScriptedGit::default());
    let forge = Arc::new(RecordingForge::default());
    let chat = CannedChat::new(vec![diff_reply("src/app.ts")]);
    let deps = deps_with(&repo, chat, git.clone(), FakeSandbox::ok(), forge.clone());
    let incident = incident();

    let outcome = run_auto_fix(&deps, &incident, None, 5).await;
    let branch = format!("autofix/{}", incident.id);
    match outcome {
        FixOutcome::Submitted { pr_url, branch: b } => {
            assert_eq!(pr_url, "https://github.com/acme/shop/pull/9");
            assert_eq!(b, branch);
        }
        other => panic!("expected submitted, got {other:?}"),
    }

    let calls = git.calls();
    assert!(calls.iter().any(|c| c == "status --porcelain"));
    assert!(calls.iter().any(|c| c == "checkout main"));
    assert!(calls.iter().any(|c| c == &format!("checkout -b {branch}")));
    assert!(calls.iter().any(|c| c == "add -A"));
    assert!(calls
        .iter()
        .any(|c| c == &format!("commit -m fix: {}", incident.title)));
    assert!(calls.iter().any(|c| c == &format!("push -u origin {branch}")));

    let prs = forge.prs.lock().unwrap().clone();
    assert_eq!(prs.len(), 1);
    assert!(prs[0].2.contains("## What changed"));
    assert!(prs[0].2.contains("## Safety checks"));
    assert!(prs[0].2.contains("Closes #5"));

    let labels = forge.labels.lock().unwrap().clone();
    assert_eq!(labels, vec![(9, vec!["autofix".to_string()])]);

    let comments = forge.comments();
    assert!(comments
        .iter()
        .any(|(n, body)| *n == 5 && body.contains("pull/9")));
}

#[tokio::test]
async fn failing_sandbox_tests_block_the_fix() {
    let (_tmp, repo) = repo_fixture();
    let git = Arc::new(ScriptedGit::default());
    let forge = Arc::new(RecordingForge::default());
    let chat = CannedChat::new(vec![diff_reply("src/app.ts")]);
    let sandbox = FakeSandbox::with_exit_codes(vec![1]);
    let deps = deps_with(&repo, chat, git.clone(), sandbox, forge.clone());

    let outcome = run_auto_fix(&deps, &incident(), None, 5).await;
    match outcome {
        FixOutcome::Failed { reason, .. } => {
            assert_eq!(reason, FailReason::SandboxValidationFailed)
        }
        other => panic!("expected sandbox_validation_failed, got {other:?}"),
    }
    assert!(forge.comments()[0].1.contains("sandbox validation"));
    assert!(!git.calls().iter().any(|c| c.contains("push")));
}

#[tokio::test]
async fn dirty_target_clone_aborts_promotion() {
    let (_tmp, repo) = repo_fixture();
    let git = Arc::new(ScriptedGit {
        dirty_status: true,
        ..ScriptedGit::default()
    });
    let forge = Arc::new(RecordingForge::default());
    let chat = CannedChat::new(vec![diff_reply("src/app.ts")]);
    let deps = deps_with(&repo, chat, git, FakeSandbox::ok(), forge);

    let outcome = run_auto_fix(&deps, &incident(), None, 5).await;
    match outcome {
        FixOutcome::Failed { reason, .. } => assert_eq!(reason, FailReason::DirtyRepo),
        other => panic!("expected dirty_repo, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_pull_request_is_reported() {
    let (_tmp, repo) = repo_fixture();
    let git = Arc::new(ScriptedGit::default());
    let forge = Arc::new(RecordingForge {
        reject_pr: true,
        ..RecordingForge::default()
    });
    let chat = CannedChat::new(vec![diff_reply("src/app.ts")]);
    let deps = deps_with(&repo, chat, git, FakeSandbox::ok(), forge.clone());

    let outcome = run_auto_fix(&deps, &incident(), None, 5).await;
    match outcome {
        FixOutcome::Failed { reason, .. } => assert_eq!(reason, FailReason::PrCreateFailed),
        other => panic!("expected pr_create_failed, got {other:?}"),
    }
    assert!(forge
        .comments()
        .iter()
        .any(|(_, body)| body.contains("pull request creation was rejected")));
}

#[tokio::test]
async fn malformed_diff_falls_back_to_rewrite() {
    let (_tmp, repo) = repo_fixture();
    let git = Arc::new(ScriptedGit::default());
    let forge = Arc::new(RecordingForge::default());
    // First reply: diff without markers. Second: a valid rewrite for a new file.
    let rewrite = r#"{"summary":"s","reason":"r","testPlan":["t"],
        "files":[{"path":"src/guard.ts","content":"export const guard = true;"}]}"#;
    let chat = CannedChat::new(vec![
        r#"{"summary":"s","reason":"r","testPlan":["t"],"diff":"no markers here"}"#,
        rewrite,
    ]);
    let deps = deps_with(&repo, chat, git, FakeSandbox::ok(), forge);

    let outcome = run_auto_fix(&deps, &incident(), None, 5).await;
    assert!(matches!(outcome, FixOutcome::Submitted { .. }));
    // The rewrite was applied to the real clone during promotion.
    assert!(repo.join("src/guard.ts").exists());
}
