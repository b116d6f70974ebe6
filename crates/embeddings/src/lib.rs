//! Embedding adapters: one HTTP provider per backend, all returning vectors
//! of the configured fixed dimension. Anthropic has no embedding endpoint,
//! so auto-selection considers openai then gemini.

use async_trait::async_trait;
use common::{EmbeddingConfig, LlmConfig, ProviderPreference};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("embedding provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("embedding provider returned no vector")]
    EmptyReply,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
    fn dimension(&self) -> usize;
}

/// OpenAI `/v1/embeddings` adapter.
pub struct OpenAiEmbedder {
    api_key: String,
    model: String,
    dimension: usize,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: String, dimension: usize, endpoint: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            api_key,
            model,
            dimension,
            endpoint: endpoint.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            client,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.endpoint))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&OpenAiEmbedRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OpenAiEmbedResponse = response.json().await?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbedError::EmptyReply)?;
        debug!(model = %self.model, dim = vector.len(), "embedded text via OpenAI");
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Gemini `:embedContent` adapter.
pub struct GeminiEmbedder {
    api_key: String,
    model: String,
    dimension: usize,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GeminiEmbedRequest<'a> {
    content: GeminiContent<'a>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedResponse {
    embedding: GeminiEmbedding,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    pub fn new(api_key: String, model: String, dimension: usize, endpoint: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            api_key,
            model,
            dimension,
            endpoint: endpoint
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            client,
        }
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let response = self
            .client
            .post(format!(
                "{}/models/{}:embedContent",
                self.endpoint, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&GeminiEmbedRequest {
                content: GeminiContent {
                    parts: vec![GeminiPart { text }],
                },
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GeminiEmbedResponse = response.json().await?;
        if parsed.embedding.values.is_empty() {
            return Err(EmbedError::EmptyReply);
        }
        Ok(parsed.embedding.values)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Resolve the configured embedding provider against the available keys.
/// `None` disables vectorisation: the indexer stores chunks without
/// embeddings and the retriever returns nothing.
pub fn embedder_from_config(
    embedding: &EmbeddingConfig,
    llm: &LlmConfig,
) -> Option<Arc<dyn Embedder>> {
    let openai_key = llm.openai_api_key.clone();
    let gemini_key = llm.gemini_api_key.clone();

    match embedding.preference {
        ProviderPreference::OpenAi => openai_key.map(|key| {
            Arc::new(OpenAiEmbedder::new(
                key,
                embedding.model.clone(),
                embedding.dimension,
                None,
            )) as Arc<dyn Embedder>
        }),
        ProviderPreference::Gemini => gemini_key.map(|key| {
            Arc::new(GeminiEmbedder::new(
                key,
                embedding.model.clone(),
                embedding.dimension,
                None,
            )) as Arc<dyn Embedder>
        }),
        // No Anthropic embedding endpoint exists; an explicit preference for
        // it resolves to unavailable.
        ProviderPreference::Anthropic => None,
        ProviderPreference::Auto => {
            if let Some(key) = openai_key {
                Some(Arc::new(OpenAiEmbedder::new(
                    key,
                    embedding.model.clone(),
                    embedding.dimension,
                    None,
                )) as Arc<dyn Embedder>)
            } else {
                gemini_key.map(|key| {
                    Arc::new(GeminiEmbedder::new(
                        key,
                        embedding.model.clone(),
                        embedding.dimension,
                        None,
                    )) as Arc<dyn Embedder>
                })
            }
        }
    }
}
