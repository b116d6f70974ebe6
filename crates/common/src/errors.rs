use thiserror::Error;

/// Configuration problems surfaced while reading the environment.
///
/// These are deliberately non-fatal at parse time: `AgentConfig::from_env`
/// falls back to defaults and logs, and operations that genuinely need the
/// missing piece report themselves skipped instead of crashing the worker.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required option: {0}")]
    Missing(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
