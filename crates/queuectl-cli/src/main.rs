mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use queuectl_shared::{ConfigStore, Store};
use tokio::sync::RwLock;
use tracing::error;

use error::CliError;

#[derive(Parser)]
#[command(name = "queuectl", about = "A durable background job queue")]
struct Cli {
    /// Path to the SQLite job store.
    #[arg(long, global = true, default_value = "./queuectl.db")]
    database: PathBuf,
    /// Path to the JSON configuration document.
    #[arg(long, global = true, default_value = "./config.json")]
    config: PathBuf,
    /// Directory for worker_threads.json / stop_signal.json.
    #[arg(long, global = true, default_value = "./state")]
    state_dir: PathBuf,
    /// Directory for per-job log files.
    #[arg(long, global = true, default_value = "./logs")]
    log_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue a job from a JSON descriptor: {"command": "...", ...}
    Enqueue { json: String },
    /// List jobs, optionally filtered by status.
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// Manage running workers.
    #[command(subcommand)]
    Worker(WorkerCommand),
    /// Inspect and manage the dead-letter queue.
    #[command(subcommand)]
    Dlq(DlqCommand),
    /// Show job summary and worker liveness.
    Status,
    /// Manage persisted configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum WorkerCommand {
    /// Start worker(s) and block until interrupted.
    Start {
        #[arg(long)]
        count: Option<usize>,
    },
    /// Signal a running worker manager to shut down.
    Stop,
}

#[derive(Subcommand)]
enum DlqCommand {
    /// List dead-lettered jobs.
    List,
    /// Reset attempts and return a job to the pending queue.
    Retry { id: String },
    /// Delete all dead-lettered jobs.
    Purge {
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    Set { key: String, value: String },
    Get { key: String },
    Show,
    Reset,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "queuectl=info".to_string()))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("{} {err}", style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let database_path = cli.database.to_string_lossy().into_owned();
    let store = Store::connect(&database_path).await?;
    let config = ConfigStore::load(&cli.config)?;

    match cli.command {
        Command::Enqueue { json } => commands::enqueue::run(&json, &store, &config).await,
        Command::List { status } => commands::jobs::list(&store, status.as_deref()).await,
        Command::Worker(WorkerCommand::Start { count }) => {
            let config = Arc::new(RwLock::new(config));
            commands::worker::start(store, config, &cli.state_dir, &cli.log_dir, count).await
        }
        Command::Worker(WorkerCommand::Stop) => commands::worker::stop(&cli.state_dir).await,
        Command::Dlq(DlqCommand::List) => commands::jobs::dlq_list(&store).await,
        Command::Dlq(DlqCommand::Retry { id }) => commands::jobs::dlq_retry(&store, &id).await,
        Command::Dlq(DlqCommand::Purge { confirm }) => {
            commands::jobs::dlq_purge(&store, confirm).await
        }
        Command::Status => commands::jobs::status(&store, &cli.state_dir).await,
        Command::Config(sub) => {
            let mut config = config;
            match sub {
                ConfigCommand::Set { key, value } => commands::config::set(&mut config, &key, &value),
                ConfigCommand::Get { key } => commands::config::get(&config, &key),
                ConfigCommand::Show => commands::config::show(&config),
                ConfigCommand::Reset => commands::config::reset(&mut config),
            }
        }
    }
}
