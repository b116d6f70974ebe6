use super::{with_retry, ChatProvider, ChatRequest, LlmError, ProviderKind, RetryConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
    retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String, endpoint: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            api_key,
            model,
            endpoint: endpoint
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
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
impl ChatProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart {
                    text: request.prompt.clone(),
                }],
            }],
            system_instruction: request.system.clone().map(|text| GeminiSystemInstruction {
                parts: vec![GeminiPart { text }],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        debug!(model = %self.model, "sending generateContent to Gemini");

        with_retry("gemini", &self.retry, || {
            let client = self.client.clone();
            let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
            let api_key = self.api_key.clone();
            let body = body.clone();
            async move {
                let response = client
                    .post(&url)
                    .header("x-goog-api-key", api_key)
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

                let parsed: GeminiResponse = response.json().await?;
                let text: String = parsed
                    .candidates
                    .into_iter()
                    .next()
                    .map(|c| {
                        c.content
                            .parts
                            .into_iter()
                            .map(|p| p.text)
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default();
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
    async fn completes_against_mock_endpoint() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-1.5-flash:generateContent")
            .match_header("x-goog-api-key", "key")
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"reply"}]}}]}"#)
            .create_async()
            .await;

        let provider =
            GeminiProvider::new("key".into(), "gemini-1.5-flash".into(), Some(server.url()));
        let reply = provider.complete(ChatRequest::new("hi")).await.unwrap();
        assert_eq!(reply, "reply");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_candidates_is_empty_reply() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-1.5-flash:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let provider =
            GeminiProvider::new("key".into(), "gemini-1.5-flash".into(), Some(server.url()));
        let err = provider.complete(ChatRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyReply));
    }
}
