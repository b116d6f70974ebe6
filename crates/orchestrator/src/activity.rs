use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Execution envelope for one activity: a per-attempt start-to-close
/// deadline and a bounded retry policy with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    pub start_to_close: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close: Duration::from_secs(120),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl ActivityOptions {
    /// The auto-fix activity is long and non-retryable: the engine carries
    /// its own internal recovery and must not run twice for one incident.
    pub fn auto_fix() -> Self {
        Self {
            start_to_close: Duration::from_secs(15 * 60),
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_millis() as f64);
        let jittered = capped * rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_millis(jittered as u64)
    }
}

/// Run one activity under its options. Each attempt races the start-to-close
/// deadline via `tokio::time::timeout`, whose timer is dropped (cancelled)
/// on both completion and expiry. Timeouts count as failures and are retried
/// like any other error until attempts are exhausted.
pub async fn run_activity<T, F, Fut>(
    name: &str,
    options: &ActivityOptions,
    operation: F,
) -> anyhow::Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        debug!(activity = name, attempt = attempt + 1, "starting activity attempt");
        let result = match tokio::time::timeout(options.start_to_close, operation()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "activity {name} timed out after {:?}",
                options.start_to_close
            )),
        };

        match result {
            Ok(value) => {
                if attempt > 0 {
                    debug!(activity = name, attempts = attempt + 1, "activity recovered");
                }
                return Ok(value);
            }
            Err(err) => {
                attempt += 1;
                if attempt >= options.max_attempts {
                    warn!(
                        activity = name,
                        attempts = attempt,
                        error = %err,
                        "activity failed permanently"
                    );
                    return Err(err);
                }
                let delay = options.backoff_for(attempt - 1);
                warn!(
                    activity = name,
                    attempt,
                    max_attempts = options.max_attempts,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "activity failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
