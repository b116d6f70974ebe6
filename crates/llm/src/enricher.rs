use crate::extract::parse_summary;
use crate::providers::{ChatRequest, LlmClient};
use domain::{Incident, IncidentSummary};
use tracing::{debug, warn};

const SYSTEM: &str = "You are a site-reliability engineer analysing a production incident. \
Reply with pure JSON only, no markdown, matching exactly this schema: \
{\"summary\": string, \"rootCause\": string, \"recommendedActions\": string[], \
\"suggestedSeverity\": \"low\"|\"medium\"|\"high\"|\"critical\", \
\"suggestedLabels\": string[], \"confidence\": number between 0 and 1}";

fn build_prompt(incident: &Incident) -> String {
    let evidence = incident
        .evidence
        .iter()
        .map(|line| format!("- {line}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Incident detected from production logs.\n\
         Title: {}\n\
         Severity (detector): {}\n\
         Signal key: {}\n\
         Event count: {}\n\
         Window: {} .. {} (ns since epoch)\n\
         Evidence:\n{}\n\n\
         Summarise the incident, give the most likely root cause, and list \
         concrete recommended actions.",
        incident.title,
        incident.severity,
        incident.key,
        incident.count,
        incident.first_seen,
        incident.last_seen,
        evidence
    )
}

/// Ask the configured provider for an incident summary. Every failure mode
/// (no provider, transport error, schema violation) degrades to `None`; the
/// issue is simply created without enrichment.
pub async fn summarize_incident(
    client: Option<&LlmClient>,
    incident: &Incident,
) -> Option<IncidentSummary> {
    let client = client?;
    let request = ChatRequest::new(build_prompt(incident))
        .with_system(SYSTEM)
        .with_max_tokens(1024);

    match client.complete(request).await {
        Ok(reply) => {
            let parsed = parse_summary(&reply);
            if parsed.is_none() {
                warn!(incident = %incident.id, "enrichment reply failed schema validation");
            }
            parsed
        }
        Err(err) => {
            warn!(incident = %incident.id, error = %err, "enrichment request failed");
            None
        }
    }
}

/// Render the issue body, with or without an enrichment section.
pub fn issue_body(incident: &Incident, summary: Option<&IncidentSummary>) -> String {
    let mut body = format!(
        "## Incident\n\n\
         | | |\n|---|---|\n\
         | Severity | {} |\n\
         | Signal | `{}` |\n\
         | Events | {} |\n\
         | First seen | {} |\n\
         | Last seen | {} |\n\n\
         ## Evidence\n\n",
        incident.severity, incident.key, incident.count, incident.first_seen, incident.last_seen
    );
    for line in &incident.evidence {
        body.push_str(&format!("- `{line}`\n"));
    }

    match summary {
        Some(s) => {
            body.push_str(&format!(
                "\n## Analysis\n\n{}\n\n**Root cause:** {}\n\n**Recommended actions:**\n",
                s.summary, s.root_cause
            ));
            for action in &s.recommended_actions {
                body.push_str(&format!("- {action}\n"));
            }
            body.push_str(&format!(
                "\n_Suggested severity: {} (confidence {:.2})_\n",
                s.suggested_severity, s.confidence
            ));
        }
        None => {
            body.push_str("\n## Analysis\n\nnot_configured_or_failed\n");
        }
    }

    debug!(incident = %incident.id, "composed issue body");
    body
}
