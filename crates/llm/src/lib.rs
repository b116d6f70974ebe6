//! Multi-provider language-model layer.
//!
//! A [`ChatProvider`] adapter exists per provider (OpenAI, Anthropic,
//! Gemini); the selection policy resolves the operator's preference against
//! the available API keys. Replies are expected as JSON, tolerated inside
//! free text, and validated into typed variants; anything that fails
//! validation degrades to `None` rather than an error.

mod enricher;
mod extract;
pub mod providers;
mod synthesizer;

pub use enricher::{issue_body, summarize_incident};
pub use extract::{extract_json, normalize_reply, parse_diff_proposal, parse_rewrite_proposal, parse_summary};
pub use providers::{resolve_kind, ChatProvider, ChatRequest, LlmClient, LlmError, ProviderKind};
pub use synthesizer::{propose_diff, propose_rewrite};
