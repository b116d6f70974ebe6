use anyhow::Context as _;
use common::AgentConfig;
use embeddings::{embedder_from_config, Embedder};
use ingest::LokiClient;
use llm::LlmClient;
use memory::Store;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tools::{DockerSandbox, ForgeClient, GitHubForge, GitRunner, SandboxRunner, SystemGit};

/// Every dependency an activity may need, threaded explicitly instead of
/// living in process-wide globals. Clients are cheap and built eagerly; the
/// database pool is created lazily on first use and shared afterwards.
pub struct AgentContext {
    pub config: AgentConfig,
    store: OnceCell<Store>,
    llm: Option<LlmClient>,
    embedder: Option<Arc<dyn Embedder>>,
    git: Arc<dyn GitRunner>,
    sandbox: Arc<dyn SandboxRunner>,
    forge: Option<Arc<dyn ForgeClient>>,
    loki: LokiClient,
}

impl AgentContext {
    pub fn new(config: AgentConfig) -> Self {
        let llm = LlmClient::from_config(&config.llm);
        let embedder = embedder_from_config(&config.embedding, &config.llm);
        let forge = match (&config.github_token, &config.repo) {
            (Some(token), Some(target)) => Some(Arc::new(GitHubForge::new(
                token.clone(),
                target.clone(),
                None,
            )) as Arc<dyn ForgeClient>),
            _ => None,
        };
        let loki = LokiClient::new(config.loki_url.clone());

        Self {
            store: OnceCell::new(),
            llm,
            embedder,
            git: Arc::new(SystemGit::new()),
            sandbox: Arc::new(DockerSandbox::new()),
            forge,
            loki,
            config,
        }
    }

    /// The shared Postgres store, connected on first use.
    pub async fn store(&self) -> anyhow::Result<&Store> {
        let dsn = self
            .config
            .postgres_url
            .as_deref()
            .context("POSTGRES_URL is not configured")?;
        self.store
            .get_or_try_init(|| async {
                Store::connect(dsn, self.config.embedding.dimension)
                    .await
                    .context("failed to connect to postgres")
            })
            .await
    }

    pub fn llm(&self) -> Option<&LlmClient> {
        self.llm.as_ref()
    }

    pub fn embedder(&self) -> Option<Arc<dyn Embedder>> {
        self.embedder.clone()
    }

    pub fn git(&self) -> Arc<dyn GitRunner> {
        self.git.clone()
    }

    pub fn sandbox(&self) -> Arc<dyn SandboxRunner> {
        self.sandbox.clone()
    }

    pub fn forge(&self) -> Option<Arc<dyn ForgeClient>> {
        self.forge.clone()
    }

    pub fn loki(&self) -> &LokiClient {
        &self.loki
    }
}
