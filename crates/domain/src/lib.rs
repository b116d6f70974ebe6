//! Core entity types shared by every crate in the workspace.
//!
//! Everything here is plain data: no I/O, no clients, no pools. The
//! orchestration and storage layers depend on these types, never the other
//! way around.

mod fix;
mod incident;
mod log_event;
mod repo;

pub use fix::{FailReason, FixOutcome, FixProposal, RewriteFile};
pub use incident::{
    AutoFixFloor, EscalationThreshold, Incident, IncidentSummary, Severity, SeverityParseError,
};
pub use log_event::LogEvent;
pub use repo::{RepoChunk, RepoIndexState, RepoTarget, RetrievedChunk, CANONICAL_HOST};
