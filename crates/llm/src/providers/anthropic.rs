use super::{with_retry, ChatProvider, ChatRequest, LlmError, ProviderKind, RetryConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
    retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, endpoint: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            api_key,
            model,
            endpoint: endpoint.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            client,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            messages: vec![AnthropicMessage {
                role: "user",
                content: request.prompt.clone(),
            }],
            temperature: request.temperature,
        };

        debug!(model = %self.model, "sending message request to Anthropic");

        with_retry("anthropic", &self.retry, || {
            let client = self.client.clone();
            let url = format!("{}/v1/messages", self.endpoint);
            let api_key = self.api_key.clone();
            let body = body.clone();
            async move {
                let response = client
                    .post(&url)
                    .header("x-api-key", api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .header("Content-Type", "application/json")
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(LlmError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }

                let parsed: AnthropicResponse = response.json().await?;
                let text: String = parsed
                    .content
                    .into_iter()
                    .map(|c| c.text)
                    .collect::<Vec<_>>()
                    .join("");
                if text.is_empty() {
                    Err(LlmError::EmptyReply)
                } else {
                    Ok(text)
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn completes_and_joins_content_blocks() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_body(r#"{"content":[{"type":"text","text":"{\"a\":"},{"type":"text","text":"1}"}]}"#)
            .create_async()
            .await;

        let provider =
            AnthropicProvider::new("key".into(), "claude-3-5-sonnet-latest".into(), Some(server.url()));
        let reply = provider.complete(ChatRequest::new("hi")).await.unwrap();
        assert_eq!(reply, "{\"a\":1}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_is_surfaced_after_retries() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(429)
            .with_body("slow down")
            .expect(2)
            .create_async()
            .await;

        let retry = RetryConfig {
            max_retries: 1,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        };
        let provider =
            AnthropicProvider::new("key".into(), "claude-3-5-sonnet-latest".into(), Some(server.url()))
                .with_retry_config(retry);

        let err = provider.complete(ChatRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 429, .. }));
        mock.assert_async().await;
    }
}
