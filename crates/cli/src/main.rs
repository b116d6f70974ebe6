use clap::{Parser, Subcommand};
use common::{init_logging, AgentConfig, LogFormat};
use orchestrator::{run_once, run_worker, AgentContext};
use std::sync::Arc;
use tracing::{error, info};

mod health_checks;

use health_checks::run_health_checks;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Reliability agent: log ingestion, incident escalation, automated fixes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the long-running workflow worker
    Worker,
    /// Trigger a single workflow execution and print the result
    Run,
    /// Probe external dependencies and exit non-zero if any are down
    Healthcheck,
}

#[tokio::main]
async fn main() {
    if let Err(err) = init_logging(LogFormat::from_env()) {
        eprintln!("failed to initialise logging: {err}");
        std::process::exit(1);
    }

    let cli = Cli::parse();
    let config = AgentConfig::from_env();

    match cli.command {
        Commands::Worker => {
            info!("starting vigil worker");
            let context = Arc::new(AgentContext::new(config));
            if let Err(err) = run_worker(context).await {
                // The orchestrator restarts the process on exit code 1.
                error!(error = %err, "worker terminated unrecoverably");
                std::process::exit(1);
            }
        }
        Commands::Run => {
            let context = Arc::new(AgentContext::new(config));
            match run_once(context).await {
                Ok(result) => {
                    let rendered = serde_json::to_string_pretty(&result)
                        .unwrap_or_else(|_| format!("{result:?}"));
                    println!("{rendered}");
                }
                Err(err) => {
                    error!(error = %err, "workflow run failed");
                    std::process::exit(1);
                }
            }
        }
        Commands::Healthcheck => {
            let healthy = run_health_checks(&config).await;
            std::process::exit(if healthy { 0 } else { 1 });
        }
    }
}
