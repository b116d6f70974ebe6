use crate::extract::{parse_diff_proposal, parse_rewrite_proposal};
use crate::providers::{ChatRequest, LlmClient};
use domain::{FixProposal, Incident, IncidentSummary, RetrievedChunk};
use tracing::warn;

const DIFF_SYSTEM: &str = "You are an automated code-fix generator. Reply with pure JSON only, \
matching exactly this schema: {\"summary\": string, \"reason\": string, \
\"testPlan\": string[], \"diff\": string}. The diff field holds a unified diff.";

const REWRITE_SYSTEM: &str = "You are an automated code-fix generator. Reply with pure JSON only, \
matching exactly this schema: {\"summary\": string, \"reason\": string, \
\"testPlan\": string[], \"files\": [{\"path\": string, \"content\": string}]}. \
Each files entry holds the COMPLETE new content of that file.";

const STRICT_DIFF_RULES: &str = "STRICT DIFF REQUIREMENTS:\n\
- every touched file starts with a `diff --git a/<path> b/<path>` header\n\
- followed by `--- a/<path>` and `+++ b/<path>` lines\n\
- at least one `@@` hunk per file\n\
- context lines must be copied VERBATIM from the repository context below\n\
- the diff must apply cleanly with `git apply`";

fn context_section(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return "No repository context was retrieved.".to_string();
    }
    let mut out = String::from("Repository context (most relevant first):\n");
    for chunk in chunks {
        out.push_str(&format!("\n--- {} (score {:.3}) ---\n{}\n", chunk.path, chunk.score, chunk.content));
    }
    out
}

fn incident_section(incident: &Incident, summary: Option<&IncidentSummary>) -> String {
    let mut out = format!(
        "Incident: {}\nSeverity: {}\nEvents: {}\nEvidence:\n",
        incident.title, incident.severity, incident.count
    );
    for line in &incident.evidence {
        out.push_str(&format!("- {line}\n"));
    }
    if let Some(s) = summary {
        out.push_str(&format!("\nAnalysis: {}\nRoot cause: {}\n", s.summary, s.root_cause));
    }
    out
}

/// Ask for a unified-diff proposal. `strict` adds the git-header mandate used
/// on the first attempt of the auto-fix pipeline.
pub async fn propose_diff(
    client: Option<&LlmClient>,
    incident: &Incident,
    summary: Option<&IncidentSummary>,
    chunks: &[RetrievedChunk],
    strict: bool,
) -> Option<FixProposal> {
    let client = client?;
    let mut prompt = format!(
        "{}\n{}\n\nProduce a minimal, focused fix for this incident as a unified diff.\n",
        incident_section(incident, summary),
        context_section(chunks)
    );
    if strict {
        prompt.push_str(STRICT_DIFF_RULES);
    }

    let request = ChatRequest::new(prompt)
        .with_system(DIFF_SYSTEM)
        .with_max_tokens(4096);

    match client.complete(request).await {
        Ok(reply) => {
            let parsed = parse_diff_proposal(&reply);
            if parsed.is_none() {
                warn!(incident = %incident.id, "diff proposal failed schema validation");
            }
            parsed
        }
        Err(err) => {
            warn!(incident = %incident.id, error = %err, "diff proposal request failed");
            None
        }
    }
}

/// Ask for a whole-file rewrite proposal, the fallback when patching fails.
pub async fn propose_rewrite(
    client: Option<&LlmClient>,
    incident: &Incident,
    summary: Option<&IncidentSummary>,
    chunks: &[RetrievedChunk],
) -> Option<FixProposal> {
    let client = client?;
    let prompt = format!(
        "{}\n{}\n\nProduce a minimal fix for this incident as complete replacement \
         files. Only include files that must change, and keep every unrelated \
         line of each file exactly as it appears in the repository context.\n",
        incident_section(incident, summary),
        context_section(chunks)
    );

    let request = ChatRequest::new(prompt)
        .with_system(REWRITE_SYSTEM)
        .with_max_tokens(8192);

    match client.complete(request).await {
        Ok(reply) => {
            let parsed = parse_rewrite_proposal(&reply);
            if parsed.is_none() {
                warn!(incident = %incident.id, "rewrite proposal failed schema validation");
            }
            parsed
        }
        Err(err) => {
            warn!(incident = %incident.id, error = %err, "rewrite proposal request failed");
            None
        }
    }
}
