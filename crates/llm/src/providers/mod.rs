mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use common::{LlmConfig, ProviderPreference};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned an empty reply")]
    EmptyReply,
}

impl LlmError {
    /// 429, 5xx and request timeouts are worth retrying; everything else
    /// (auth, bad request) is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status == 429 || *status == 408 || *status >= 500,
            Self::EmptyReply => false,
        }
    }
}

/// One prompt round-trip. System text is optional; the provider decides how
/// to encode it.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 2048,
            temperature: 0.2,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn model(&self) -> &str;
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }
}

/// Bounded exponential backoff with jitter, shared by the provider adapters.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(20),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let jittered = capped * rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_millis(jittered as u64)
    }
}

/// Run a provider request with the shared retry policy.
pub(crate) async fn with_retry<F, Fut>(
    provider: &'static str,
    retry: &RetryConfig,
    operation: F,
) -> Result<String, LlmError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<String, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(reply) => return Ok(reply),
            Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                let delay = retry.delay_for(attempt);
                warn!(
                    provider,
                    attempt = attempt + 1,
                    max = retry.max_retries,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "retryable provider failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Pure provider-selection policy: explicit preferences require their key,
/// `auto` takes the first available in openai → anthropic → gemini order.
pub fn resolve_kind(
    preference: ProviderPreference,
    has_openai: bool,
    has_anthropic: bool,
    has_gemini: bool,
) -> Option<ProviderKind> {
    match preference {
        ProviderPreference::OpenAi => has_openai.then_some(ProviderKind::OpenAi),
        ProviderPreference::Anthropic => has_anthropic.then_some(ProviderKind::Anthropic),
        ProviderPreference::Gemini => has_gemini.then_some(ProviderKind::Gemini),
        ProviderPreference::Auto => {
            if has_openai {
                Some(ProviderKind::OpenAi)
            } else if has_anthropic {
                Some(ProviderKind::Anthropic)
            } else if has_gemini {
                Some(ProviderKind::Gemini)
            } else {
                None
            }
        }
    }
}

/// The resolved chat client the pipeline holds. `None` when no usable
/// provider is configured, which callers treat as "no enrichment / no fix".
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn ChatProvider>,
}

impl LlmClient {
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        let kind = resolve_kind(
            config.preference,
            config.openai_api_key.is_some(),
            config.anthropic_api_key.is_some(),
            config.gemini_api_key.is_some(),
        )?;

        let provider: Arc<dyn ChatProvider> = match kind {
            ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
                config.openai_api_key.clone()?,
                config.openai_model.clone(),
                None,
            )),
            ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
                config.anthropic_api_key.clone()?,
                config.anthropic_model.clone(),
                None,
            )),
            ProviderKind::Gemini => Arc::new(GeminiProvider::new(
                config.gemini_api_key.clone()?,
                config.gemini_model.clone(),
                None,
            )),
        };

        Some(Self { provider })
    }

    pub fn from_provider(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        self.provider.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_prefers_openai_then_anthropic_then_gemini() {
        let auto = ProviderPreference::Auto;
        assert_eq!(resolve_kind(auto, true, true, true), Some(ProviderKind::OpenAi));
        assert_eq!(resolve_kind(auto, false, true, true), Some(ProviderKind::Anthropic));
        assert_eq!(resolve_kind(auto, false, false, true), Some(ProviderKind::Gemini));
        assert_eq!(resolve_kind(auto, false, false, false), None);
    }

    #[test]
    fn explicit_preference_requires_matching_key() {
        assert_eq!(
            resolve_kind(ProviderPreference::Anthropic, true, false, true),
            None
        );
        assert_eq!(
            resolve_kind(ProviderPreference::Anthropic, false, true, false),
            Some(ProviderKind::Anthropic)
        );
    }

    #[test]
    fn retryable_classification_follows_status() {
        assert!(LlmError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(LlmError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!LlmError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(!LlmError::Status { status: 400, body: String::new() }.is_retryable());
    }

    #[test]
    fn backoff_delay_grows_and_caps() {
        let retry = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            backoff_multiplier: 2.0,
        };
        // Jitter is ±20%, so compare against generous bounds.
        assert!(retry.delay_for(0) <= Duration::from_millis(120));
        assert!(retry.delay_for(10) <= Duration::from_millis(480));
    }
}
