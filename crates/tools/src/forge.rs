use async_trait::async_trait;
use domain::{RepoTarget, CANONICAL_HOST};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("forge request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx replies carry the status and response body as the reason
    /// string shown to the caller (and ultimately on the issue).
    #[error("forge returned status {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueRef {
    pub number: u64,
    #[serde(rename = "html_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    #[serde(rename = "html_url")]
    pub url: String,
}

/// The forge surface the pipeline needs: issues, comments, pull requests,
/// labels. Everything else the forge offers is out of scope.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<IssueRef, ForgeError>;

    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<(), ForgeError>;

    async fn create_pull_request(
        &self,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<PullRequestRef, ForgeError>;

    async fn add_labels(&self, issue_number: u64, labels: &[String]) -> Result<(), ForgeError>;
}

/// GitHub REST implementation. Enterprise hosts get the `/api/v3` prefix.
pub struct GitHubForge {
    token: String,
    target: RepoTarget,
    api_base: String,
    client: reqwest::Client,
}

impl GitHubForge {
    pub fn new(token: String, target: RepoTarget, api_base: Option<String>) -> Self {
        let api_base = api_base.unwrap_or_else(|| {
            if target.host == CANONICAL_HOST {
                "https://api.github.com".to_string()
            } else {
                format!("https://{}/api/v3", target.host)
            }
        });
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            token,
            target,
            api_base,
            client,
        }
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, ForgeError> {
        let url = format!(
            "{}/repos/{}/{}{}",
            self.api_base, self.target.owner, self.target.repo, path
        );
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "vigil-agent")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ForgeError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl ForgeClient for GitHubForge {
    async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<IssueRef, ForgeError> {
        let response = self
            .post(
                "/issues",
                json!({ "title": title, "body": body, "labels": labels }),
            )
            .await?;
        let issue: IssueRef = response.json().await?;
        info!(number = issue.number, "created issue");
        Ok(issue)
    }

    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<(), ForgeError> {
        self.post(
            &format!("/issues/{issue_number}/comments"),
            json!({ "body": body }),
        )
        .await?;
        debug!(issue = issue_number, "posted issue comment");
        Ok(())
    }

    async fn create_pull_request(
        &self,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<PullRequestRef, ForgeError> {
        let response = self
            .post(
                "/pulls",
                json!({ "title": title, "head": head, "base": base, "body": body }),
            )
            .await?;
        let pr: PullRequestRef = response.json().await?;
        info!(number = pr.number, head, "opened pull request");
        Ok(pr)
    }

    async fn add_labels(&self, issue_number: u64, labels: &[String]) -> Result<(), ForgeError> {
        self.post(
            &format!("/issues/{issue_number}/labels"),
            json!({ "labels": labels }),
        )
        .await?;
        Ok(())
    }
}
