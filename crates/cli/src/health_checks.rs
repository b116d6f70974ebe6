use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use colored::Colorize;
use common::AgentConfig;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Attempts per check before it is declared down.
const CHECK_ATTEMPTS: u32 = 3;

/// Pause between attempts.
const CHECK_BACKOFF: Duration = Duration::from_secs(2);

/// Per-attempt deadline.
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug)]
struct HealthCheckResult {
    component: String,
    status: HealthStatus,
    message: String,
    latency_ms: u64,
}

#[async_trait]
trait HealthCheck: Send + Sync {
    fn name(&self) -> String;
    async fn check(&self) -> Result<()>;
}

struct LokiReady {
    url: String,
}

#[async_trait]
impl HealthCheck for LokiReady {
    fn name(&self) -> String {
        "loki".to_string()
    }

    async fn check(&self) -> Result<()> {
        let response = reqwest::get(format!("{}/ready", self.url.trim_end_matches('/'))).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("/ready returned {}", response.status()))
        }
    }
}

struct PostgresCheck {
    dsn: String,
}

#[async_trait]
impl HealthCheck for PostgresCheck {
    fn name(&self) -> String {
        "postgres".to_string()
    }

    async fn check(&self) -> Result<()> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.dsn)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        pool.close().await;
        Ok(())
    }
}

struct WorkflowBackendCheck {
    address: String,
}

#[async_trait]
impl HealthCheck for WorkflowBackendCheck {
    fn name(&self) -> String {
        "workflow-backend".to_string()
    }

    async fn check(&self) -> Result<()> {
        tokio::net::TcpStream::connect(&self.address).await?;
        Ok(())
    }
}

struct DemoCheck {
    url: String,
}

#[async_trait]
impl HealthCheck for DemoCheck {
    fn name(&self) -> String {
        "demo-service".to_string()
    }

    async fn check(&self) -> Result<()> {
        let response = reqwest::get(&self.url).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("returned {}", response.status()))
        }
    }
}

async fn run_with_retry(check: &dyn HealthCheck) -> HealthCheckResult {
    let start = Instant::now();
    let mut last_error = String::new();

    for attempt in 1..=CHECK_ATTEMPTS {
        let outcome = match timeout(CHECK_TIMEOUT, check.check()).await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some(format!("timed out after {}s", CHECK_TIMEOUT.as_secs())),
        };

        match outcome {
            None => {
                return HealthCheckResult {
                    component: check.name(),
                    status: HealthStatus::Healthy,
                    message: "ok".to_string(),
                    latency_ms: start.elapsed().as_millis() as u64,
                };
            }
            Some(err) => {
                debug!(check = %check.name(), attempt, error = %err, "health check attempt failed");
                last_error = err;
                if attempt < CHECK_ATTEMPTS {
                    tokio::time::sleep(CHECK_BACKOFF).await;
                }
            }
        }
    }

    HealthCheckResult {
        component: check.name(),
        status: HealthStatus::Unhealthy,
        message: last_error,
        latency_ms: start.elapsed().as_millis() as u64,
    }
}

/// Probe every configured dependency, print a report, and return whether
/// all of them passed.
pub async fn run_health_checks(config: &AgentConfig) -> bool {
    let mut checks: Vec<Box<dyn HealthCheck>> = vec![Box::new(LokiReady {
        url: config.loki_url.clone(),
    })];
    if let Some(dsn) = &config.postgres_url {
        checks.push(Box::new(PostgresCheck { dsn: dsn.clone() }));
    }
    if let Some(address) = &config.temporal_address {
        checks.push(Box::new(WorkflowBackendCheck {
            address: address.clone(),
        }));
    }
    if let Some(url) = &config.demo_url {
        checks.push(Box::new(DemoCheck { url: url.clone() }));
    }

    let mut results = Vec::with_capacity(checks.len());
    for check in &checks {
        results.push(run_with_retry(check.as_ref()).await);
    }

    println!("\n{}", "=== Health Check Results ===".bright_blue().bold());
    println!("Timestamp: {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    for result in &results {
        let icon = match result.status {
            HealthStatus::Healthy => "✓".green(),
            HealthStatus::Unhealthy => "✗".red(),
        };
        println!(
            "{} {} - {} ({}ms)",
            icon,
            result.component.bright_white(),
            result.message,
            result.latency_ms
        );
    }

    let healthy = results.iter().all(|r| r.status == HealthStatus::Healthy);
    let overall = if healthy {
        "HEALTHY".green()
    } else {
        "UNHEALTHY".red()
    };
    println!("\n{}: {}", "Overall Status".bright_white().bold(), overall);
    healthy
}
