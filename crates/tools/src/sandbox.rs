use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Exit code reported when the container is killed at the deadline, matching
/// what the runtime returns for SIGKILL.
const KILLED_EXIT_CODE: i32 = 137;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to spawn container runtime: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct Mount {
    pub host: String,
    pub container: String,
    pub read_only: bool,
}

/// One isolated command execution: image, argv, bind mounts, environment,
/// working directory, and a hard wall-clock deadline. Networking is always
/// disabled.
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    pub image: String,
    pub argv: Vec<String>,
    pub workdir: Option<String>,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<Mount>,
    pub timeout: Duration,
}

/// Merged stdout+stderr (arrival order, best-effort) plus the exit code.
/// A non-zero exit is data for the caller, never an error.
#[derive(Debug, Clone)]
pub struct SandboxResult {
    pub exit_code: i32,
    pub output: String,
}

impl SandboxResult {
    /// Last `n` bytes of output, for issue comments and PR bodies.
    pub fn tail(&self, n: usize) -> &str {
        let start = self.output.len().saturating_sub(n);
        // Avoid splitting a UTF-8 sequence.
        let mut start = start;
        while start < self.output.len() && !self.output.is_char_boundary(start) {
            start += 1;
        }
        &self.output[start..]
    }
}

#[async_trait]
pub trait SandboxRunner: Send + Sync {
    async fn run(&self, spec: SandboxSpec) -> Result<SandboxResult, SandboxError>;
}

/// Docker-backed sandbox:
/// `docker run --rm --network none [-w] [-e]… [-v host:ctr:mode]… <image> <argv…>`.
#[derive(Debug, Clone, Default)]
pub struct DockerSandbox;

impl DockerSandbox {
    pub fn new() -> Self {
        Self
    }

    /// Full docker argv for a spec. Split out for testability.
    pub fn docker_args(spec: &SandboxSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--network".to_string(),
            "none".to_string(),
        ];
        if let Some(workdir) = &spec.workdir {
            args.push("-w".to_string());
            args.push(workdir.clone());
        }
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        for mount in &spec.mounts {
            let mode = if mount.read_only { "ro" } else { "rw" };
            args.push("-v".to_string());
            args.push(format!("{}:{}:{}", mount.host, mount.container, mode));
        }
        args.push(spec.image.clone());
        args.extend(spec.argv.iter().cloned());
        args
    }
}

#[async_trait]
impl SandboxRunner for DockerSandbox {
    async fn run(&self, spec: SandboxSpec) -> Result<SandboxResult, SandboxError> {
        let args = Self::docker_args(&spec);
        debug!(image = %spec.image, timeout_s = spec.timeout.as_secs(), "starting sandbox");

        let mut child = Command::new("docker")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Interleave stdout and stderr lines in arrival order.
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let timed_out;
        let status = match tokio::time::timeout(spec.timeout, child.wait()).await {
            Ok(status) => {
                timed_out = false;
                Some(status?)
            }
            Err(_) => {
                warn!(timeout_s = spec.timeout.as_secs(), "sandbox deadline hit, killing container");
                timed_out = true;
                let _ = child.kill().await;
                child.wait().await.ok()
            }
        };

        let mut output = String::new();
        while let Some(line) = rx.recv().await {
            output.push_str(&line);
            output.push('\n');
        }

        let exit_code = if timed_out {
            KILLED_EXIT_CODE
        } else {
            status.and_then(|s| s.code()).unwrap_or(KILLED_EXIT_CODE)
        };

        debug!(exit_code, bytes = output.len(), "sandbox finished");
        Ok(SandboxResult { exit_code, output })
    }
}
