use crate::context::AgentContext;
use async_trait::async_trait;
use autofix::AutoFixDeps;
use chrono::Utc;
use domain::{FixOutcome, Incident, IncidentSummary, LogEvent};
use llm::issue_body;
use memory::ChunkStore;
use rag::{index_repo, RepoCache};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tools::IssueRef;
use tracing::{info, warn};
use uuid::Uuid;

/// The workflow's only window onto the outside world. One method per
/// activity; the production implementation below talks to the real backends
/// and tests substitute scripted mocks.
#[async_trait]
pub trait Activities: Send + Sync {
    /// Refresh the repo cache and re-synchronise the vector index.
    async fn refresh_repo_cache(&self) -> anyhow::Result<()>;

    async fn fetch_logs(&self, lookback_minutes: u64, query: &str)
        -> anyhow::Result<Vec<LogEvent>>;

    async fn detect_incidents(&self, events: &[LogEvent]) -> anyhow::Result<Vec<Incident>>;

    async fn persist_incidents(&self, incidents: &[Incident]) -> anyhow::Result<()>;

    async fn summarize_incident(
        &self,
        incident: &Incident,
    ) -> anyhow::Result<Option<IncidentSummary>>;

    /// Open a tracking issue. `None` means the forge is not configured; the
    /// incident is recorded but not escalated.
    async fn create_issue(
        &self,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
    ) -> anyhow::Result<Option<IssueRef>>;

    async fn run_auto_fix(
        &self,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
        issue: &IssueRef,
    ) -> anyhow::Result<FixOutcome>;
}

/// Production activity set backed by the [`AgentContext`].
pub struct ProductionActivities {
    context: Arc<AgentContext>,
}

impl ProductionActivities {
    pub fn new(context: Arc<AgentContext>) -> Self {
        Self { context }
    }

    /// The clone the indexer walks: the explicit path when configured, else
    /// the managed cache.
    async fn indexable_repo(&self) -> anyhow::Result<Option<(PathBuf, String)>> {
        let config = &self.context.config;
        if let Some(path) = &config.rag.repo_path {
            let key = config
                .repo
                .as_ref()
                .map(|t| t.repo_key())
                .unwrap_or_else(|| "local".to_string());
            return Ok(Some((PathBuf::from(path), key)));
        }
        let Some(target) = &config.repo else {
            return Ok(None);
        };
        let cache = RepoCache::new(self.context.git(), &config.rag.cache_dir);
        let path = cache
            .ensure(
                target,
                config.github_token.as_deref(),
                &config.default_branch,
                config.rag.refresh,
            )
            .await?;
        Ok(Some((path, target.repo_key())))
    }
}

#[async_trait]
impl Activities for ProductionActivities {
    async fn refresh_repo_cache(&self) -> anyhow::Result<()> {
        let Some((path, repo_key)) = self.indexable_repo().await? else {
            info!("no repository target configured, skipping cache refresh");
            return Ok(());
        };

        let store = self.context.store().await?;
        let embedder = self.context.embedder();
        let stats = index_repo(
            store,
            embedder.as_deref(),
            self.context.git().as_ref(),
            &path,
            &repo_key,
            self.context.config.rag.chunk_size,
            self.context.config.rag.chunk_overlap,
        )
        .await?;
        if !stats.skipped_up_to_date {
            info!(
                repo_key,
                files = stats.files,
                embedded = stats.chunks_embedded,
                "repository index refreshed"
            );
        }
        Ok(())
    }

    async fn fetch_logs(
        &self,
        lookback_minutes: u64,
        query: &str,
    ) -> anyhow::Result<Vec<LogEvent>> {
        let end_ns = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or(i64::MAX) as i128;
        let start_ns = end_ns - (lookback_minutes as i128) * 60 * 1_000_000_000;
        let events = self
            .context
            .loki()
            .query_range(query, 1000, start_ns, end_ns)
            .await?;
        Ok(events)
    }

    async fn detect_incidents(&self, events: &[LogEvent]) -> anyhow::Result<Vec<Incident>> {
        Ok(ingest::detect_incidents(events))
    }

    async fn persist_incidents(&self, incidents: &[Incident]) -> anyhow::Result<()> {
        if incidents.is_empty() {
            return Ok(());
        }
        let store = self.context.store().await?;

        // Incident embeddings are best-effort context for future retrieval.
        let mut embeddings: HashMap<Uuid, Vec<f32>> = HashMap::new();
        if let Some(embedder) = self.context.embedder() {
            for incident in incidents {
                let text = format!("{}\n{}", incident.title, incident.evidence.join("\n"));
                match embedder.embed(&text).await {
                    Ok(vector) => {
                        embeddings.insert(incident.id, vector);
                    }
                    Err(err) => {
                        warn!(incident = %incident.id, error = %err, "incident embedding failed");
                    }
                }
            }
        }

        store.persist_incidents(incidents, &embeddings).await?;
        Ok(())
    }

    async fn summarize_incident(
        &self,
        incident: &Incident,
    ) -> anyhow::Result<Option<IncidentSummary>> {
        Ok(llm::summarize_incident(self.context.llm(), incident).await)
    }

    async fn create_issue(
        &self,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
    ) -> anyhow::Result<Option<IssueRef>> {
        let Some(forge) = self.context.forge() else {
            warn!("forge is not configured, incident will not be escalated");
            return Ok(None);
        };

        let body = issue_body(incident, summary);
        let mut labels = vec!["incident".to_string(), incident.severity.to_string()];
        if let Some(summary) = summary {
            for label in &summary.suggested_labels {
                if !labels.contains(label) {
                    labels.push(label.clone());
                }
            }
        }

        let issue = forge.create_issue(&incident.title, &body, &labels).await?;
        info!(incident = %incident.id, issue = issue.number, "escalated incident");
        Ok(Some(issue))
    }

    async fn run_auto_fix(
        &self,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
        issue: &IssueRef,
    ) -> anyhow::Result<FixOutcome> {
        let Some(forge) = self.context.forge() else {
            return Ok(FixOutcome::skipped("forge is not configured"));
        };
        let store = self.context.store().await?.clone();
        let deps = AutoFixDeps {
            config: self.context.config.clone(),
            store: Arc::new(store) as Arc<dyn ChunkStore>,
            embedder: self.context.embedder(),
            llm: self.context.llm().cloned(),
            git: self.context.git(),
            sandbox: self.context.sandbox(),
            forge,
        };
        Ok(autofix::run_auto_fix(&deps, incident, summary, issue.number).await)
    }
}
