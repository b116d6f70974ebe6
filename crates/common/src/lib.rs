//! Shared runtime plumbing: configuration, error base types, logging.

mod config;
mod errors;
mod logging;

pub use config::{
    AgentConfig, AutoFixConfig, EmbeddingConfig, LlmConfig, ProviderPreference, RagConfig,
    RefreshPolicy,
};
pub use errors::ConfigError;
pub use logging::{init_logging, LogFormat, OperationTimer};
