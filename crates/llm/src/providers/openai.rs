use super::{with_retry, ChatProvider, ChatRequest, LlmError, ProviderKind, RetryConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
    retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, endpoint: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            api_key,
            model,
            endpoint: endpoint.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
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
impl ChatProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(OpenAiMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(OpenAiMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        let body = OpenAiChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(model = %self.model, "sending chat completion to OpenAI");

        with_retry("openai", &self.retry, || {
            let client = self.client.clone();
            let url = format!("{}/chat/completions", self.endpoint);
            let api_key = self.api_key.clone();
            let body = body.clone();
            async move {
                let response = client
                    .post(&url)
                    .header("Authorization", format!("Bearer {api_key}"))
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

                let parsed: OpenAiChatResponse = response.json().await?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or(LlmError::EmptyReply)
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
    async fn completes_against_mock_endpoint() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"{\"ok\":true}"}}]}"#,
            )
            .create_async()
            .await;

        let provider = OpenAiProvider::new("key".into(), "gpt-4o-mini".into(), Some(server.url()));
        let reply = provider
            .complete(ChatRequest::new("hello"))
            .await
            .expect("completion should succeed");
        assert_eq!(reply, "{\"ok\":true}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_on_server_error_then_succeeds() {
        let mut server = Server::new_async().await;
        let failures = server
            .mock("POST", "/chat/completions")
            .with_status(502)
            .with_body("bad gateway")
            .expect(2)
            .create_async()
            .await;
        let success = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"recovered"}}]}"#)
            .create_async()
            .await;

        let retry = RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 1.5,
        };
        let provider = OpenAiProvider::new("key".into(), "gpt-4o-mini".into(), Some(server.url()))
            .with_retry_config(retry);

        let reply = provider.complete(ChatRequest::new("x")).await.unwrap();
        assert_eq!(reply, "recovered");
        failures.assert_async().await;
        success.assert_async().await;
    }

    #[tokio::test]
    async fn auth_error_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"bad key"}}"#)
            .expect(1)
            .create_async()
            .await;

        let provider = OpenAiProvider::new("bad".into(), "gpt-4o-mini".into(), Some(server.url()));
        let err = provider.complete(ChatRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 401, .. }));
        mock.assert_async().await;
    }
}
