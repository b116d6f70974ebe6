use domain::LogEvent;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("log backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("log backend returned status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    data: QueryRangeData,
}

#[derive(Debug, Deserialize)]
struct QueryRangeData {
    #[serde(default)]
    result: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
struct StreamResult {
    #[serde(default)]
    stream: BTreeMap<String, String>,
    /// `[timestamp_ns, line]` pairs.
    #[serde(default)]
    values: Vec<[String; 2]>,
}

/// Range-query client for a Loki-compatible log backend.
#[derive(Debug, Clone)]
pub struct LokiClient {
    base_url: String,
    client: reqwest::Client,
}

impl LokiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Fetch all events matching `query` in `[start_ns, end_ns]`, sorted by
    /// numeric timestamp ascending.
    pub async fn query_range(
        &self,
        query: &str,
        limit: u32,
        start_ns: i128,
        end_ns: i128,
    ) -> Result<Vec<LogEvent>, IngestError> {
        let url = format!("{}/loki/api/v1/query_range", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", query),
                ("limit", &limit.to_string()),
                ("start", &start_ns.to_string()),
                ("end", &end_ns.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: QueryRangeResponse = response.json().await?;
        let mut events: Vec<LogEvent> = parsed
            .data
            .result
            .into_iter()
            .flat_map(|stream| {
                let labels = stream.stream;
                stream.values.into_iter().map(move |[ts, line]| LogEvent {
                    timestamp: ts,
                    message: line,
                    labels: labels.clone(),
                })
            })
            .collect();

        events.sort_by_key(|e| e.timestamp_ns());
        debug!(count = events.len(), %query, "fetched log events");
        Ok(events)
    }
}
