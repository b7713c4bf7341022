//! caravan — run a job list across a pool of worker machines.
//!
//! Reads the job list from config.json and the worker list from
//! workers.json, prepares local folders, then distributes the jobs
//! greedily over one execution slot per declared worker CPU.
//!
//! # Usage
//!
//! ```text
//! caravan run --config config.json --workers workers.json
//! caravan run --config config.json --workers workers.json --serial
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use caravan_core::config::{self, RunConfig};
use caravan_scheduler::{ClusterScheduler, JobOutcome};
use caravan_session::LocalConnector;

#[derive(Parser)]
#[command(name = "caravan", about = "Distribute shell jobs across a worker pool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every job in the config across the worker pool.
    Run {
        /// Job list and local preparation steps.
        #[arg(long, default_value = "config.json")]
        config: PathBuf,

        /// Worker machines, one pool slot per declared CPU.
        #[arg(long, default_value = "workers.json")]
        workers: PathBuf,

        /// Submit jobs one at a time instead of concurrently.
        #[arg(long)]
        serial: bool,

        /// Temporary-files root on the workers that per-job working
        /// directories are created under.
        #[arg(long, default_value = "/tmp")]
        remote_root: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,caravan=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            workers,
            serial,
            remote_root,
        } => run(config, workers, serial, remote_root).await,
    }
}

async fn run(
    config_path: PathBuf,
    workers_path: PathBuf,
    serial: bool,
    remote_root: String,
) -> anyhow::Result<ExitCode> {
    let config = RunConfig::from_file(&config_path)?;
    let hosts = config::load_hosts(&workers_path)?;

    config::prepare_local(&config)?;
    let jobs = config.into_jobs()?;
    info!(jobs = jobs.len(), workers = hosts.len(), "configuration loaded");

    let scheduler =
        ClusterScheduler::new(Arc::new(LocalConnector)).with_remote_root(remote_root);

    let outcomes = if serial {
        scheduler.run_serial(&hosts, jobs).await?
    } else {
        scheduler.run(&hosts, jobs).await?
    };

    Ok(report(&outcomes))
}

/// Print one line per job and fold the outcomes into the process exit
/// code: success only if every job ran and every command exited zero.
fn report(outcomes: &[JobOutcome]) -> ExitCode {
    let mut failed = 0usize;
    for outcome in outcomes {
        match outcome {
            Ok(result) if result.command_succeeded() => {
                println!("{}: ok", result.job_id);
            }
            Ok(result) => {
                failed += 1;
                println!("{}: exit code {}", result.job_id, result.exit_code);
                print_output(&result.stderr);
            }
            Err(e) => {
                failed += 1;
                println!("{}: failed: {e}", e.job_id());
            }
        }
    }
    println!("{} jobs, {} failed", outcomes.len(), failed);
    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_output(bytes: &[u8]) {
    let text = String::from_utf8_lossy(bytes);
    for line in text.lines() {
        println!("    {line}");
    }
}
