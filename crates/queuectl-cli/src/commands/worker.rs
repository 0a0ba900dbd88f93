use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use console::style;
use queuectl_shared::{ConfigStore, Store, SystemClock};
use queuectl_worker::WorkerManager;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::CliError;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(500);
const STOP_JOIN_DEADLINE: Duration = Duration::from_secs(10);

pub async fn start(
    store: Store,
    config: Arc<RwLock<ConfigStore>>,
    state_dir: &Path,
    log_dir: &Path,
    count: Option<usize>,
) -> Result<(), CliError> {
    let worker_count = match count {
        Some(count) => count,
        None => config.read().await.worker_count().max(1) as usize,
    };

    let mut manager = WorkerManager::new(
        store,
        Arc::new(SystemClock),
        config,
        state_dir.to_path_buf(),
        log_dir.to_path_buf(),
    );
    manager.start(worker_count).await?;

    println!(
        "{} {} worker(s) started",
        style("✓").green().bold(),
        worker_count
    );

    wait_for_shutdown_signal().await;

    manager.stop();
    manager.join(STOP_JOIN_DEADLINE).await;
    println!("{} workers stopped", style("✓").green().bold());
    Ok(())
}

/// Issued from a separate `queuectl` invocation: there is no shared
/// in-process cancellation flag to set, so this writes the stop sentinel
/// directly and polls for the running manager's liveness file to
/// disappear, mirroring the original CLI's out-of-process stop command.
pub async fn stop(state_dir: &Path) -> Result<(), CliError> {
    std::fs::create_dir_all(state_dir).ok();
    let signal_path = state_dir.join("stop_signal.json");
    let tmp_path = signal_path.with_extension("tmp");
    let payload = serde_json::json!({ "stop": true, "timestamp": Utc::now().to_rfc3339() });
    std::fs::write(&tmp_path, serde_json::to_string_pretty(&payload).unwrap())
        .and_then(|_| std::fs::rename(&tmp_path, &signal_path))
        .map_err(|err| CliError::InvalidJobDescriptor(format!("failed to write stop signal: {err}")))?;

    println!("{} stop signal written", style("✓").green().bold());

    let threads_path = state_dir.join("worker_threads.json");
    let deadline = std::time::Instant::now() + STOP_JOIN_DEADLINE;
    while threads_path.exists() && std::time::Instant::now() < deadline {
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }

    if threads_path.exists() {
        println!(
            "{} workers did not confirm shutdown within {:?}",
            style("!").yellow().bold(),
            STOP_JOIN_DEADLINE
        );
    } else {
        println!("{} workers confirmed shutdown", style("✓").green().bold());
    }
    Ok(())
}

/// Waits for either an interrupt or a terminate signal so that `worker
/// start` shuts down gracefully under both `Ctrl-C` and `kill`/systemd
/// `SIGTERM`, letting in-flight jobs finish rather than being killed mid-run.
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received (SIGINT)");
        }
        _ = terminate.recv() => {
            info!("shutdown signal received (SIGTERM)");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl-c");
    info!("shutdown signal received");
}
