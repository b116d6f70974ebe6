use domain::{Incident, LogEvent, Severity};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// One classified event, before bucket aggregation.
struct Signal {
    key: String,
    severity: Severity,
    label: &'static str,
    message: String,
    timestamp_ns: i128,
    timestamp: String,
}

struct Bucket {
    severity: Severity,
    label: &'static str,
    evidence: Vec<String>,
    first_seen_ns: i128,
    first_seen: String,
    last_seen_ns: i128,
    last_seen: String,
    count: u64,
}

/// Cluster a range-query result into incidents, one per signal bucket key.
///
/// Classification is pure: equal inputs produce equal buckets (only the
/// generated ids differ). Output is ordered severity-descending then
/// key-ascending so escalation order is deterministic.
pub fn detect_incidents(events: &[LogEvent]) -> Vec<Incident> {
    let mut buckets: HashMap<String, Bucket> = HashMap::new();

    for event in events {
        let signal = classify(event);
        let bucket = buckets.entry(signal.key.clone()).or_insert_with(|| Bucket {
            severity: signal.severity,
            label: signal.label,
            evidence: Vec::new(),
            first_seen_ns: signal.timestamp_ns,
            first_seen: signal.timestamp.clone(),
            last_seen_ns: signal.timestamp_ns,
            last_seen: signal.timestamp.clone(),
            count: 0,
        });

        bucket.count += 1;
        if bucket.evidence.len() < 5 {
            bucket.evidence.push(signal.message.clone());
        }
        if signal.timestamp_ns < bucket.first_seen_ns {
            bucket.first_seen_ns = signal.timestamp_ns;
            bucket.first_seen = signal.timestamp.clone();
        }
        if signal.timestamp_ns > bucket.last_seen_ns {
            bucket.last_seen_ns = signal.timestamp_ns;
            bucket.last_seen = signal.timestamp;
        }
    }

    let mut incidents: Vec<Incident> = buckets
        .into_iter()
        .map(|(key, bucket)| Incident {
            id: Uuid::new_v4(),
            title: format!("Incident: {} ({})", bucket.label, key),
            key,
            label: bucket.label.to_string(),
            severity: bucket.severity,
            evidence: bucket.evidence,
            first_seen: bucket.first_seen,
            last_seen: bucket.last_seen,
            count: bucket.count,
        })
        .collect();

    // Bucket iteration order is map-defined; sort so escalation and issue
    // creation order replay identically.
    incidents.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.key.cmp(&b.key)));

    debug!(
        events = events.len(),
        incidents = incidents.len(),
        "detector pass complete"
    );
    incidents
}

/// Assign the fixed signal pattern for one event. Malformed JSON in the
/// message body is never fatal; the raw line is classified as-is.
fn classify(event: &LogEvent) -> Signal {
    let mut message = event.message.clone();
    let mut event_type: Option<String> = None;
    let mut route: Option<String> = None;

    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(&event.message) {
        if let Some(Value::String(msg)) = obj.get("msg") {
            message = msg.clone();
        }
        if let Some(Value::String(t)) = obj.get("type") {
            event_type = Some(t.clone());
        }
        if let Some(Value::String(r)) = obj.get("route") {
            route = Some(r.clone());
        }
    }

    let route = route.unwrap_or_else(|| "unknown".to_string());

    let (key, severity, label) = if event_type.as_deref() == Some("error_burst")
        || message.contains("Synthetic error burst")
    {
        (format!("error_burst:{route}"), Severity::High, "error_burst")
    } else if message.contains("Simulated error") {
        (format!("error:{route}"), Severity::High, "error")
    } else if message.contains("Slow response") {
        (format!("slow:{route}"), Severity::Medium, "latency")
    } else if message.contains("Failed login attempt") {
        (format!("auth:{route}"), Severity::Low, "auth")
    } else {
        (format!("other:{route}"), Severity::Low, "unknown")
    };

    Signal {
        key,
        severity,
        label,
        message,
        timestamp_ns: event.timestamp_ns(),
        timestamp: event.timestamp.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn event(ts: &str, message: &str) -> LogEvent {
        LogEvent {
            timestamp: ts.to_string(),
            message: message.to_string(),
            labels: BTreeMap::new(),
        }
    }

    fn json_event(ts: &str, body: serde_json::Value) -> LogEvent {
        event(ts, &body.to_string())
    }

    #[test]
    fn burst_and_latency_become_two_incidents() {
        let events = vec![
            json_event(
                "1",
                serde_json::json!({"msg": "Synthetic error burst", "type": "error_burst", "route": "/api/orders"}),
            ),
            json_event("2", serde_json::json!({"msg": "Slow response", "route": "/slow"})),
        ];

        let incidents = detect_incidents(&events);
        assert_eq!(incidents.len(), 2);
        let severities: Vec<Severity> = incidents.iter().map(|i| i.severity).collect();
        assert_eq!(severities, vec![Severity::High, Severity::Medium]);
        assert_eq!(incidents[0].key, "error_burst:/api/orders");
        assert_eq!(incidents[0].title, "Incident: error_burst (error_burst:/api/orders)");
        assert_eq!(incidents[1].key, "slow:/slow");
        assert_eq!(incidents[1].label, "latency");
    }

    #[test]
    fn empty_input_yields_no_incidents() {
        assert!(detect_incidents(&[]).is_empty());
    }

    #[test]
    fn malformed_json_is_classified_from_raw_message() {
        let events = vec![event("1", "{{not json, Simulated error somewhere")];
        let incidents = detect_incidents(&events);
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].key, "error:unknown");
        assert_eq!(incidents[0].severity, Severity::High);
    }

    #[test]
    fn missing_route_defaults_to_unknown() {
        let events = vec![json_event("1", serde_json::json!({"msg": "Failed login attempt"}))];
        let incidents = detect_incidents(&events);
        assert_eq!(incidents[0].key, "auth:unknown");
        assert_eq!(incidents[0].severity, Severity::Low);
    }

    #[test]
    fn bucket_aggregates_count_evidence_and_range() {
        let mut events = Vec::new();
        for i in 0..7 {
            events.push(json_event(
                &format!("{}", 100 + i),
                serde_json::json!({"msg": format!("Simulated error {i}"), "route": "/x"}),
            ));
        }
        let incidents = detect_incidents(&events);
        assert_eq!(incidents.len(), 1);
        let inc = &incidents[0];
        assert_eq!(inc.count, 7);
        assert_eq!(inc.evidence.len(), 5);
        assert_eq!(inc.evidence[0], "Simulated error 0");
        assert_eq!(inc.first_seen, "100");
        assert_eq!(inc.last_seen, "106");
    }

    #[test]
    fn timestamps_compare_numerically_not_lexicographically() {
        // "99" > "100" as strings but 99 < 100 numerically.
        let events = vec![
            event("100", "Slow response on /a"),
            event("99", "Slow response on /a"),
        ];
        let incidents = detect_incidents(&events);
        assert_eq!(incidents[0].first_seen, "99");
        assert_eq!(incidents[0].last_seen, "100");
    }

    #[test]
    fn detector_is_pure_modulo_ids() {
        let events = vec![
            json_event("1", serde_json::json!({"msg": "Simulated error", "route": "/a"})),
            json_event("2", serde_json::json!({"msg": "Slow response", "route": "/b"})),
            event("3", "background noise"),
        ];
        let a = detect_incidents(&events);
        let b = detect_incidents(&events);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_ne!(x.id, y.id);
            assert_eq!(x.key, y.key);
            assert_eq!(x.severity, y.severity);
            assert_eq!(x.evidence, y.evidence);
            assert_eq!(x.count, y.count);
            assert_eq!(x.first_seen, y.first_seen);
            assert_eq!(x.last_seen, y.last_seen);
        }
    }

    #[test]
    fn ordering_is_severity_desc_then_key() {
        let events = vec![
            event("1", "noise zebra"),
            json_event("2", serde_json::json!({"msg": "Simulated error", "route": "/b"})),
            json_event("3", serde_json::json!({"msg": "Simulated error", "route": "/a"})),
            json_event("4", serde_json::json!({"msg": "Slow response", "route": "/c"})),
        ];
        let incidents = detect_incidents(&events);
        let keys: Vec<&str> = incidents.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["error:/a", "error:/b", "slow:/c", "other:unknown"]);
    }

    #[test]
    fn msg_field_replaces_display_message() {
        let events = vec![json_event(
            "1",
            serde_json::json!({"msg": "Slow response", "route": "/r", "extra": 1}),
        )];
        let incidents = detect_incidents(&events);
        assert_eq!(incidents[0].evidence[0], "Slow response");
    }
}
