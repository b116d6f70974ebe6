//! The workflow runtime: retryable activities with start-to-close deadlines,
//! the deterministic incident workflow, and the long-running worker host.
//!
//! The workflow body performs no I/O of its own; every external effect goes
//! through the [`Activities`] seam, which the worker backs with the real
//! clients and tests back with scripted mocks.

mod activities;
mod activity;
mod context;
mod worker;
mod workflow;

pub use activities::{Activities, ProductionActivities};
pub use activity::{run_activity, ActivityOptions};
pub use context::AgentContext;
pub use worker::{run_once, run_worker, RUN_DEADLINE};
pub use workflow::{incident_workflow, WorkflowInput, WorkflowResult};
