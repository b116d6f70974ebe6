use crate::errors::ConfigError;
use domain::{AutoFixFloor, EscalationThreshold, RepoTarget, Severity, CANONICAL_HOST};
use std::env;
use std::str::FromStr;
use tracing::warn;

/// Which language-model / embedding provider the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderPreference {
    Auto,
    OpenAi,
    Anthropic,
    Gemini,
}

impl FromStr for ProviderPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            other => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".into(),
                value: other.into(),
            }),
        }
    }
}

/// How the repo cache refreshes an existing clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    Pull,
    Reclone,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub preference: ProviderPreference,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub preference: ProviderPreference,
    pub model: String,
    pub dimension: usize,
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub top_k: usize,
    pub min_score: f64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Explicit local checkout to index instead of the managed cache.
    pub repo_path: Option<String>,
    pub cache_dir: String,
    pub refresh: RefreshPolicy,
}

#[derive(Debug, Clone)]
pub struct AutoFixConfig {
    pub enabled: bool,
    pub severity_floor: AutoFixFloor,
    /// Explicit local clone the engine promotes fixes into.
    pub repo_path: Option<String>,
    pub branch_prefix: String,
    pub test_command: Option<String>,
    pub install_command: Option<String>,
    pub sandbox_image: String,
}

/// Everything the agent reads from the environment, parsed once at startup
/// and threaded through the activity context. Missing optional pieces never
/// crash the worker; the affected operations report themselves skipped.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub temporal_address: Option<String>,
    pub loki_url: String,
    pub loki_query: String,
    pub postgres_url: Option<String>,
    pub repo: Option<RepoTarget>,
    pub github_token: Option<String>,
    pub default_branch: String,
    pub git_user_name: Option<String>,
    pub git_user_email: Option<String>,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub rag: RagConfig,
    pub auto_fix: AutoFixConfig,
    pub auto_escalate_from: EscalationThreshold,
    pub worker_interval_secs: u64,
    pub lookback_minutes: u64,
    pub demo_url: Option<String>,
}

fn opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn or_default(key: &str, default: &str) -> String {
    opt(key).unwrap_or_else(|| default.to_string())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match opt(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "unparseable config value, using default");
            default
        }),
        None => default,
    }
}

/// Derive the repo target from `REPO_URL`, falling back to
/// `GITHUB_OWNER` + `GITHUB_REPO` on the canonical host.
fn repo_target_from_env() -> Option<RepoTarget> {
    if let Some(url) = opt("REPO_URL") {
        match parse_repo_url(&url) {
            Some(target) => return Some(target),
            None => warn!(%url, "REPO_URL is not a recognizable repository URL"),
        }
    }
    let owner = opt("GITHUB_OWNER")?;
    let repo = opt("GITHUB_REPO")?;
    Some(RepoTarget::new(CANONICAL_HOST, owner, repo))
}

/// Accepts `https://host/owner/repo(.git)` and `git@host:owner/repo(.git)`.
pub fn parse_repo_url(url: &str) -> Option<RepoTarget> {
    let rest = if let Some(rest) = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://")) {
        rest.replacen('/', " ", 1)
    } else if let Some(rest) = url.strip_prefix("git@") {
        rest.replacen(':', " ", 1)
    } else {
        return None;
    };
    let (host, path) = rest.split_once(' ')?;
    let mut parts = path.trim_end_matches('/').splitn(2, '/');
    let owner = parts.next()?;
    let repo = parts.next()?.trim_end_matches(".git");
    if host.is_empty() || owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some(RepoTarget::new(host, owner, repo))
}

impl AgentConfig {
    /// Read the full configuration from the environment. `.env` is loaded
    /// best-effort first, matching how the worker is run in development.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let llm = LlmConfig {
            preference: parse_or("LLM_PROVIDER", ProviderPreference::Auto),
            openai_api_key: opt("OPENAI_API_KEY"),
            openai_model: or_default("OPENAI_MODEL", "gpt-4o-mini"),
            anthropic_api_key: opt("ANTHROPIC_API_KEY"),
            anthropic_model: or_default("ANTHROPIC_MODEL", "claude-3-5-sonnet-latest"),
            gemini_api_key: opt("GEMINI_API_KEY"),
            gemini_model: or_default("GEMINI_MODEL", "gemini-1.5-flash"),
        };

        let embedding = EmbeddingConfig {
            preference: parse_or("EMBEDDING_PROVIDER", ProviderPreference::Auto),
            model: or_default("EMBEDDING_MODEL", "text-embedding-3-small"),
            dimension: parse_or("EMBEDDING_DIM", 1536usize),
        };

        let rag = RagConfig {
            top_k: parse_or("RAG_TOP_K", 5usize),
            min_score: parse_or("RAG_MIN_SCORE", 0.15f64),
            chunk_size: parse_or("RAG_CHUNK_SIZE", 900usize),
            chunk_overlap: parse_or("RAG_CHUNK_OVERLAP", 150usize),
            repo_path: opt("RAG_REPO_PATH"),
            cache_dir: or_default("RAG_REPO_CACHE_DIR", ".repocache"),
            refresh: match or_default("RAG_REPO_REFRESH", "pull").as_str() {
                "reclone" => RefreshPolicy::Reclone,
                _ => RefreshPolicy::Pull,
            },
        };

        let auto_fix = AutoFixConfig {
            enabled: or_default("AUTO_FIX_MODE", "off") == "on",
            severity_floor: parse_or("AUTO_FIX_SEVERITY", AutoFixFloor::AtLeast(Severity::High)),
            repo_path: opt("AUTO_FIX_REPO_PATH"),
            branch_prefix: or_default("AUTO_FIX_BRANCH_PREFIX", "autofix"),
            test_command: opt("AUTO_FIX_TEST_COMMAND"),
            install_command: opt("AUTO_FIX_INSTALL_COMMAND"),
            sandbox_image: or_default("AUTO_FIX_SANDBOX_IMAGE", "node:20-bullseye"),
        };

        Self {
            temporal_address: opt("TEMPORAL_ADDRESS"),
            loki_url: or_default("LOKI_URL", "http://localhost:3100"),
            loki_query: or_default("LOKI_QUERY", "{app=\"demo-service\"}"),
            postgres_url: opt("POSTGRES_URL"),
            repo: repo_target_from_env(),
            github_token: opt("GITHUB_TOKEN"),
            default_branch: or_default("GITHUB_DEFAULT_BRANCH", "main"),
            git_user_name: opt("GIT_USER_NAME"),
            git_user_email: opt("GIT_USER_EMAIL"),
            llm,
            embedding,
            rag,
            auto_fix,
            auto_escalate_from: parse_or(
                "AUTO_ESCALATE_FROM",
                EscalationThreshold::AtLeast(Severity::High),
            ),
            worker_interval_secs: parse_or("WORKER_INTERVAL_SECONDS", 300u64),
            lookback_minutes: parse_or("LOOKBACK_MINUTES", 5u64),
            demo_url: opt("DEMO_URL"),
        }
    }

    /// Commit identity, with the fallbacks derived from the repo owner.
    pub fn git_identity(&self) -> Option<(String, String)> {
        let owner = self.repo.as_ref().map(|r| r.owner.clone());
        let name = self
            .git_user_name
            .clone()
            .or_else(|| owner.clone())?;
        let email = self
            .git_user_email
            .clone()
            .or_else(|| owner.map(|o| format!("{o}@users.noreply.github.com")))?;
        Some((name, email))
    }
}
