use crate::activities::ProductionActivities;
use crate::context::AgentContext;
use crate::workflow::{incident_workflow, WorkflowInput, WorkflowResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Overall deadline for a one-shot `run` invocation.
pub const RUN_DEADLINE: Duration = Duration::from_secs(120);

fn input_from_config(context: &AgentContext) -> WorkflowInput {
    WorkflowInput {
        lookback_minutes: context.config.lookback_minutes,
        query: context.config.loki_query.clone(),
        auto_escalate_from: context.config.auto_escalate_from,
        auto_fix_enabled: context.config.auto_fix.enabled,
    }
}

/// Long-running worker host: one workflow execution per interval tick,
/// serialized per worker so a single indexer and a single auto-fix writer
/// touch the repo clone at a time.
pub async fn run_worker(context: Arc<AgentContext>) -> anyhow::Result<()> {
    let activities = ProductionActivities::new(context.clone());
    let interval = Duration::from_secs(context.config.worker_interval_secs.max(1));
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        interval_s = interval.as_secs(),
        lookback_m = context.config.lookback_minutes,
        "worker started 🚀"
    );

    loop {
        ticker.tick().await;
        let input = input_from_config(&context);
        match incident_workflow(&activities, input).await {
            Ok(result) => {
                info!(
                    incidents = result.incidents.len(),
                    issues = result.issues_created,
                    "workflow run complete"
                );
            }
            Err(err) => {
                // A failed run is not fatal to the worker; the next tick
                // starts a fresh workflow from persisted state.
                error!(error = %err, "workflow run failed");
            }
        }
    }
}

/// Trigger exactly one workflow execution with a hard deadline, for the
/// `run` CLI entrypoint.
pub async fn run_once(context: Arc<AgentContext>) -> anyhow::Result<WorkflowResult> {
    let activities = ProductionActivities::new(context.clone());
    let input = input_from_config(&context);
    match tokio::time::timeout(RUN_DEADLINE, incident_workflow(&activities, input)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "workflow execution exceeded {}s deadline",
            RUN_DEADLINE.as_secs()
        )),
    }
}
