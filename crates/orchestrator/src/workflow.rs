use crate::activities::Activities;
use crate::activity::{run_activity, ActivityOptions};
use domain::{EscalationThreshold, FixOutcome, Incident};
use serde::Serialize;
use tracing::{info, warn};

/// Input of one incident-workflow execution.
#[derive(Debug, Clone)]
pub struct WorkflowInput {
    pub lookback_minutes: u64,
    pub query: String,
    pub auto_escalate_from: EscalationThreshold,
    pub auto_fix_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub incidents: Vec<Incident>,
    pub issues_created: u64,
}

/// The deterministic workflow body. All non-determinism (ids, clocks, HTTP,
/// subprocesses) lives behind the activity seam; this function only
/// sequences activity calls and folds their results, so a replay with the
/// same activity results reproduces the same decisions.
pub async fn incident_workflow(
    activities: &dyn Activities,
    input: WorkflowInput,
) -> anyhow::Result<WorkflowResult> {
    let default_options = ActivityOptions::default();

    // 1. Cache refresh is best-effort: a repo that cannot be refreshed must
    // not stop incident detection and escalation.
    if let Err(err) = run_activity("refresh_repo_cache", &default_options, || {
        activities.refresh_repo_cache()
    })
    .await
    {
        warn!(error = %err, "repo cache refresh failed, continuing without index update");
    }

    // 2. Fetch the window of logs.
    let events = run_activity("fetch_logs", &default_options, || {
        activities.fetch_logs(input.lookback_minutes, &input.query)
    })
    .await?;

    // 3. Detect and persist.
    let incidents = run_activity("detect_incidents", &default_options, || {
        activities.detect_incidents(&events)
    })
    .await?;
    run_activity("persist_incidents", &default_options, || {
        activities.persist_incidents(&incidents)
    })
    .await?;

    if incidents.is_empty() {
        info!("no incidents detected in window");
        return Ok(WorkflowResult {
            incidents,
            issues_created: 0,
        });
    }

    // 4. Escalate each qualifying incident in detector order, sequentially:
    // ordering keeps issue creation deterministic and rate-limits the forge.
    let mut issues_created = 0u64;
    for incident in &incidents {
        if !input.auto_escalate_from.admits(incident.severity) {
            continue;
        }

        let summary = match run_activity("summarize_incident", &default_options, || {
            activities.summarize_incident(incident)
        })
        .await
        {
            Ok(summary) => summary,
            Err(err) => {
                warn!(incident = %incident.id, error = %err, "summarization failed, escalating without enrichment");
                None
            }
        };

        let issue = match run_activity("create_issue", &default_options, || {
            activities.create_issue(incident, summary.as_ref())
        })
        .await
        {
            Ok(Some(issue)) => issue,
            Ok(None) => continue,
            Err(err) => {
                warn!(incident = %incident.id, error = %err, "issue creation failed, skipping incident");
                continue;
            }
        };
        issues_created += 1;

        if input.auto_fix_enabled {
            match run_activity("run_auto_fix", &ActivityOptions::auto_fix(), || {
                activities.run_auto_fix(incident, summary.as_ref(), &issue)
            })
            .await
            {
                Ok(FixOutcome::Submitted { pr_url, .. }) => {
                    info!(incident = %incident.id, pr_url, "auto-fix submitted");
                }
                Ok(FixOutcome::Skipped { reason }) => {
                    info!(incident = %incident.id, reason, "auto-fix skipped");
                }
                Ok(FixOutcome::Failed { reason, detail }) => {
                    warn!(incident = %incident.id, %reason, detail, "auto-fix failed");
                }
                Err(err) => {
                    warn!(incident = %incident.id, error = %err, "auto-fix activity failed");
                }
            }
        }
    }

    Ok(WorkflowResult {
        incidents,
        issues_created,
    })
}
