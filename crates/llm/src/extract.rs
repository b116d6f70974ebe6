use domain::{FixProposal, IncidentSummary, RewriteFile};
use serde::Deserialize;

/// Strip markdown code fences from a model reply. Applied repeatedly until
/// stable, so the function is idempotent by construction.
pub fn normalize_reply(s: &str) -> String {
    let mut text = s.trim();
    loop {
        let Some(rest) = text.strip_prefix("```") else {
            break;
        };
        let Some(newline) = rest.find('\n') else {
            break;
        };
        let body = rest[newline + 1..].trim_end();
        let Some(body) = body.strip_suffix("```") else {
            break;
        };
        text = body.trim();
    }
    text.to_string()
}

/// Models are asked for pure JSON but tolerated inside free text: take the
/// substring from the first `{` to the last `}`.
pub fn extract_json(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end >= start).then(|| &s[start..=end])
}

/// Parse and validate an enrichment reply. Any schema violation degrades to
/// `None`; labels are capped at five and confidence clamped to [0, 1].
pub fn parse_summary(raw: &str) -> Option<IncidentSummary> {
    let cleaned = normalize_reply(raw);
    let json = extract_json(&cleaned)?;
    let mut summary: IncidentSummary = serde_json::from_str(json).ok()?;
    if summary.summary.trim().is_empty() || summary.recommended_actions.is_empty() {
        return None;
    }
    summary.suggested_labels.truncate(5);
    summary.confidence = summary.confidence.clamp(0.0, 1.0);
    Some(summary)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiffWire {
    summary: String,
    reason: String,
    test_plan: Vec<String>,
    diff: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RewriteWire {
    summary: String,
    reason: String,
    test_plan: Vec<String>,
    files: Vec<RewriteFileWire>,
}

#[derive(Debug, Deserialize)]
struct RewriteFileWire {
    path: String,
    content: String,
}

/// Parse and validate a diff proposal reply.
pub fn parse_diff_proposal(raw: &str) -> Option<FixProposal> {
    let cleaned = normalize_reply(raw);
    let json = extract_json(&cleaned)?;
    let wire: DiffWire = serde_json::from_str(json).ok()?;
    let diff = normalize_reply(&wire.diff);
    if wire.summary.trim().is_empty() || wire.test_plan.is_empty() || diff.is_empty() {
        return None;
    }
    Some(FixProposal::Diff {
        summary: wire.summary,
        reason: wire.reason,
        test_plan: wire.test_plan,
        diff,
    })
}

/// Parse and validate a rewrite proposal reply.
pub fn parse_rewrite_proposal(raw: &str) -> Option<FixProposal> {
    let cleaned = normalize_reply(raw);
    let json = extract_json(&cleaned)?;
    let wire: RewriteWire = serde_json::from_str(json).ok()?;
    if wire.summary.trim().is_empty() || wire.test_plan.is_empty() || wire.files.is_empty() {
        return None;
    }
    if wire.files.iter().any(|f| f.path.trim().is_empty()) {
        return None;
    }
    Some(FixProposal::Rewrite {
        summary: wire.summary,
        reason: wire.reason,
        test_plan: wire.test_plan,
        files: wire
            .files
            .into_iter()
            .map(|f| RewriteFile {
                path: f.path,
                content: f.content,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Severity;

    #[test]
    fn normalize_strips_fences_and_is_idempotent() {
        let fenced = "```json\n{\"a\": 1}\n```";
        let once = normalize_reply(fenced);
        assert_eq!(once, "{\"a\": 1}");
        assert_eq!(normalize_reply(&once), once);

        let plain = "no fences here";
        assert_eq!(normalize_reply(plain), plain);
        assert_eq!(normalize_reply(&normalize_reply(plain)), normalize_reply(plain));
    }

    #[test]
    fn extract_json_spans_first_brace_to_last() {
        let text = "Sure! Here you go: {\"a\": {\"b\": 1}} hope that helps";
        assert_eq!(extract_json(text), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json("no braces"), None);
    }

    #[test]
    fn parse_summary_accepts_valid_reply() {
        let raw = r#"{"summary":"Burst of 500s on /api/orders","rootCause":"DB pool exhausted",
            "recommendedActions":["raise pool size"],"suggestedSeverity":"high",
            "suggestedLabels":["a","b","c","d","e","f","g"],"confidence":1.4}"#;
        let summary = parse_summary(raw).expect("valid summary");
        assert_eq!(summary.suggested_severity, Severity::High);
        assert_eq!(summary.suggested_labels.len(), 5);
        assert!((summary.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_summary_rejects_non_json() {
        assert!(parse_summary("not json").is_none());
    }

    #[test]
    fn parse_summary_rejects_empty_actions() {
        let raw = r#"{"summary":"s","rootCause":"r","recommendedActions":[],
            "suggestedSeverity":"low","confidence":0.5}"#;
        assert!(parse_summary(raw).is_none());
    }

    #[test]
    fn parse_summary_tolerates_surrounding_prose() {
        let raw = "Here is the analysis you asked for:\n{\"summary\":\"s\",\"rootCause\":\"r\",\"recommendedActions\":[\"x\"],\"suggestedSeverity\":\"medium\",\"confidence\":0.7}\nLet me know!";
        assert!(parse_summary(raw).is_some());
    }

    #[test]
    fn parse_diff_proposal_unwraps_fenced_diff() {
        let raw = r#"{"summary":"fix","reason":"bug","testPlan":["run tests"],
            "diff":"```diff\ndiff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n```"}"#;
        let proposal = parse_diff_proposal(raw).expect("valid diff proposal");
        match proposal {
            FixProposal::Diff { diff, .. } => {
                assert!(diff.starts_with("diff --git"));
                assert!(!diff.contains("```"));
            }
            _ => panic!("expected diff variant"),
        }
    }

    #[test]
    fn parse_rewrite_rejects_empty_files() {
        let raw = r#"{"summary":"s","reason":"r","testPlan":["t"],"files":[]}"#;
        assert!(parse_rewrite_proposal(raw).is_none());
    }

    #[test]
    fn parse_rewrite_accepts_files() {
        let raw = r#"{"summary":"s","reason":"r","testPlan":["t"],
            "files":[{"path":"src/a.ts","content":"export {}"}]}"#;
        let proposal = parse_rewrite_proposal(raw).expect("valid rewrite");
        match proposal {
            FixProposal::Rewrite { files, .. } => assert_eq!(files[0].path, "src/a.ts"),
            _ => panic!("expected rewrite variant"),
        }
    }
}
