//! Workflow sequencing tests over a scripted activity set.

use async_trait::async_trait;
use domain::{
    EscalationThreshold, FixOutcome, Incident, IncidentSummary, LogEvent, Severity,
};
use orchestrator::{incident_workflow, Activities, WorkflowInput};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tools::IssueRef;
use uuid::Uuid;

fn incident(key: &str, severity: Severity) -> Incident {
    Incident {
        id: Uuid::new_v4(),
        key: key.to_string(),
        label: "error".into(),
        title: format!("Incident: error ({key})"),
        severity,
        evidence: vec!["Simulated error".into()],
        first_seen: "1".into(),
        last_seen: "2".into(),
        count: 2,
    }
}

fn event(message: &str) -> LogEvent {
    LogEvent {
        timestamp: "1".into(),
        message: message.into(),
        labels: BTreeMap::new(),
    }
}

#[derive(Default)]
struct MockActivities {
    events: Vec<LogEvent>,
    incidents: Vec<Incident>,
    fail_refresh: bool,
    fail_issue_creation: bool,
    forge_configured: bool,
    calls: Mutex<Vec<String>>,
}

impl MockActivities {
    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Activities for MockActivities {
    async fn refresh_repo_cache(&self) -> anyhow::Result<()> {
        self.record("refresh_repo_cache");
        if self.fail_refresh {
            anyhow::bail!("clone failed");
        }
        Ok(())
    }

    async fn fetch_logs(
        &self,
        _lookback_minutes: u64,
        _query: &str,
    ) -> anyhow::Result<Vec<LogEvent>> {
        self.record("fetch_logs");
        Ok(self.events.clone())
    }

    async fn detect_incidents(&self, events: &[LogEvent]) -> anyhow::Result<Vec<Incident>> {
        self.record("detect_incidents");
        if events.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(self.incidents.clone())
        }
    }

    async fn persist_incidents(&self, _incidents: &[Incident]) -> anyhow::Result<()> {
        self.record("persist_incidents");
        Ok(())
    }

    async fn summarize_incident(
        &self,
        _incident: &Incident,
    ) -> anyhow::Result<Option<IncidentSummary>> {
        self.record("summarize_incident");
        Ok(None)
    }

    async fn create_issue(
        &self,
        incident: &Incident,
        _summary: Option<&IncidentSummary>,
    ) -> anyhow::Result<Option<IssueRef>> {
        self.record(&format!("create_issue:{}", incident.key));
        if self.fail_issue_creation {
            anyhow::bail!("forge 500");
        }
        if !self.forge_configured {
            return Ok(None);
        }
        Ok(Some(IssueRef {
            number: 1,
            url: "https://github.com/acme/shop/issues/1".into(),
        }))
    }

    async fn run_auto_fix(
        &self,
        incident: &Incident,
        _summary: Option<&IncidentSummary>,
        _issue: &IssueRef,
    ) -> anyhow::Result<FixOutcome> {
        self.record(&format!("run_auto_fix:{}", incident.key));
        Ok(FixOutcome::skipped("test"))
    }
}

fn input(threshold: EscalationThreshold, auto_fix: bool) -> WorkflowInput {
    WorkflowInput {
        lookback_minutes: 5,
        query: "{app=\"demo\"}".into(),
        auto_escalate_from: threshold,
        auto_fix_enabled: auto_fix,
    }
}

#[tokio::test]
async fn empty_logs_stop_after_persist() {
    let activities = MockActivities {
        forge_configured: true,
        ..MockActivities::default()
    };

    let result = incident_workflow(
        &activities,
        input(EscalationThreshold::AtLeast(Severity::Low), true),
    )
    .await
    .unwrap();

    assert!(result.incidents.is_empty());
    assert_eq!(result.issues_created, 0);
    assert_eq!(
        activities.calls(),
        vec![
            "refresh_repo_cache",
            "fetch_logs",
            "detect_incidents",
            "persist_incidents"
        ],
        "no activity may run after persist for an empty window"
    );
}

#[tokio::test]
async fn only_incidents_at_or_above_threshold_escalate() {
    let activities = MockActivities {
        events: vec![event("boom")],
        incidents: vec![
            incident("error:/a", Severity::High),
            incident("slow:/b", Severity::Medium),
        ],
        forge_configured: true,
        ..MockActivities::default()
    };

    let result = incident_workflow(
        &activities,
        input(EscalationThreshold::AtLeast(Severity::High), false),
    )
    .await
    .unwrap();

    assert_eq!(result.issues_created, 1);
    let calls = activities.calls();
    assert!(calls.contains(&"create_issue:error:/a".to_string()));
    assert!(!calls.iter().any(|c| c.starts_with("create_issue:slow")));
}

#[tokio::test]
async fn escalation_disabled_by_none_sentinel() {
    let activities = MockActivities {
        events: vec![event("boom")],
        incidents: vec![incident("error:/a", Severity::Critical)],
        forge_configured: true,
        ..MockActivities::default()
    };

    let result = incident_workflow(&activities, input(EscalationThreshold::None, true))
        .await
        .unwrap();

    assert_eq!(result.issues_created, 0);
    assert!(!activities.calls().iter().any(|c| c.starts_with("create_issue")));
}

#[tokio::test]
async fn auto_fix_runs_only_for_created_issues() {
    let activities = MockActivities {
        events: vec![event("boom")],
        incidents: vec![incident("error:/a", Severity::High)],
        forge_configured: true,
        ..MockActivities::default()
    };

    incident_workflow(
        &activities,
        input(EscalationThreshold::AtLeast(Severity::Low), true),
    )
    .await
    .unwrap();

    assert!(activities
        .calls()
        .contains(&"run_auto_fix:error:/a".to_string()));
}

#[tokio::test]
async fn missing_forge_skips_auto_fix() {
    let activities = MockActivities {
        events: vec![event("boom")],
        incidents: vec![incident("error:/a", Severity::High)],
        forge_configured: false,
        ..MockActivities::default()
    };

    let result = incident_workflow(
        &activities,
        input(EscalationThreshold::AtLeast(Severity::Low), true),
    )
    .await
    .unwrap();

    assert_eq!(result.issues_created, 0);
    assert!(!activities.calls().iter().any(|c| c.starts_with("run_auto_fix")));
}

#[tokio::test]
async fn issue_creation_failure_skips_the_incident_not_the_run() {
    let activities = MockActivities {
        events: vec![event("boom")],
        incidents: vec![incident("error:/a", Severity::High)],
        forge_configured: true,
        fail_issue_creation: true,
        ..MockActivities::default()
    };

    let result = incident_workflow(
        &activities,
        input(EscalationThreshold::AtLeast(Severity::Low), true),
    )
    .await
    .unwrap();

    assert_eq!(result.issues_created, 0);
    assert_eq!(result.incidents.len(), 1);
    assert!(!activities.calls().iter().any(|c| c.starts_with("run_auto_fix")));
}

#[tokio::test]
async fn failed_cache_refresh_does_not_stop_the_run() {
    let activities = MockActivities {
        events: vec![event("boom")],
        incidents: vec![incident("error:/a", Severity::High)],
        forge_configured: true,
        fail_refresh: true,
        ..MockActivities::default()
    };

    let result = incident_workflow(
        &activities,
        input(EscalationThreshold::AtLeast(Severity::Low), false),
    )
    .await
    .unwrap();

    assert_eq!(result.issues_created, 1);
}
