//! vigild: the Vigil task agent.
//!
//! Supervises a single task described by a TOML task file:
//! - Launches the workload and runs its lifecycle hooks
//! - Runs the configured health check on a schedule
//! - Kills the workload once consecutive failures reach the threshold
//! - Writes every health report to stdout as a JSON line
//!
//! # Usage
//!
//! ```text
//! vigild run --config task.toml
//! vigild validate --config task.toml
//! vigild init web "python3 -m http.server 8080" > task.toml
//! ```

mod agent;
mod reporter;
mod supervisor;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use vigil_core::TaskFile;

#[derive(Parser)]
#[command(name = "vigild", about = "Vigil task agent")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Launch and supervise the task described by a task file.
    Run {
        /// Path to the task file.
        #[arg(long, default_value = "task.toml")]
        config: PathBuf,
    },

    /// Check a task file without launching anything.
    Validate {
        /// Path to the task file.
        #[arg(long, default_value = "task.toml")]
        config: PathBuf,
    },

    /// Print a starter task file.
    Init {
        /// Task name.
        name: String,

        /// Shell command that runs the task.
        command: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run { config } => {
            let status = agent::run_agent(&config).await?;
            if !status.success() {
                std::process::exit(status.code().unwrap_or(1));
            }
            Ok(())
        }
        Command::Validate { config } => validate(&config),
        Command::Init { name, command } => {
            let file = TaskFile::scaffold(&name, &command);
            print!("{}", file.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,vigild=debug,vigil_health=debug,vigil_hooks=debug")
    });

    // Reports own stdout; logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let file = TaskFile::from_file(path)
        .with_context(|| format!("invalid task file {}", path.display()))?;

    match file.health_check()? {
        Some(check) => info!(
            task_id = %file.task.id(),
            kind = %check.kind(),
            threshold = check.consecutive_failures,
            "task file is valid"
        ),
        None => info!(task_id = %file.task.id(), "task file is valid, no health check"),
    }
    println!("{}: ok", path.display());
    Ok(())
}
