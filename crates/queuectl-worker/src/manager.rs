use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

use chrono::Utc;
use queuectl_shared::{Clock, ConfigStore, Store};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::executor::Executor;
use crate::logs::LogWriter;
use crate::worker::Worker;

const HEARTBEAT_INTERVAL: StdDuration = StdDuration::from_secs(1);

#[derive(Debug, Serialize)]
struct WorkerLiveness {
    active_workers: usize,
    threads: Vec<String>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct StopSignal {
    stop: bool,
    timestamp: String,
}

/// Spawns and supervises the pool of `Worker` tasks: startup crash recovery,
/// a liveness heartbeat, cooperative shutdown via a shared cancellation
/// flag, and an out-of-process stop sentinel file for a separate `queuectl
/// worker stop` invocation to signal a running manager.
pub struct WorkerManager {
    store: Store,
    clock: Arc<dyn Clock>,
    config: Arc<RwLock<ConfigStore>>,
    state_dir: PathBuf,
    log_dir: PathBuf,
    cancel: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl WorkerManager {
    pub fn new(
        store: Store,
        clock: Arc<dyn Clock>,
        config: Arc<RwLock<ConfigStore>>,
        state_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            state_dir: state_dir.into(),
            log_dir: log_dir.into(),
            cancel: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
            heartbeat: None,
        }
    }

    fn worker_threads_path(&self) -> PathBuf {
        self.state_dir.join("worker_threads.json")
    }

    fn stop_signal_path(&self) -> PathBuf {
        self.state_dir.join("stop_signal.json")
    }

    /// Clears any prior cancellation/stop state, recovers orphaned
    /// `processing` rows from a previous crash, and spawns `worker_count`
    /// Worker tasks plus the liveness heartbeat.
    pub async fn start(&mut self, worker_count: usize) -> Result<(), queuectl_shared::StoreError> {
        self.cancel.store(false, Ordering::SeqCst);
        let _ = std::fs::remove_file(self.stop_signal_path());
        std::fs::create_dir_all(&self.state_dir).ok();

        let now = self.clock.now_utc();
        let recovered = self.store.recover_orphans(now).await?;
        if recovered > 0 {
            info!(recovered, "recovered orphaned processing jobs at startup");
        }

        let names: Vec<String> = (1..=worker_count).map(|n| format!("Worker-{n}")).collect();

        for name in &names {
            let worker = Worker::new(
                name.clone(),
                self.store.clone(),
                Executor,
                self.clock.clone(),
                self.config.clone(),
                LogWriter::new(self.log_dir.clone()),
                self.cancel.clone(),
            );
            let handle = tokio::spawn(worker.run());
            self.handles.push(handle);
        }

        self.write_liveness(&names);
        self.heartbeat = Some(self.spawn_heartbeat(names));

        info!(worker_count, "worker manager started");
        Ok(())
    }

    fn spawn_heartbeat(&self, names: Vec<String>) -> JoinHandle<()> {
        let path = self.worker_threads_path();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            while !cancel.load(Ordering::SeqCst) {
                write_liveness_file(&path, &names);
                tokio::time::sleep(HEARTBEAT_INTERVAL).await;
            }
        })
    }

    fn write_liveness(&self, names: &[String]) {
        write_liveness_file(&self.worker_threads_path(), names);
    }

    /// Idempotent: sets the cancellation flag (observed by every Worker
    /// within one loop iteration) and writes the stop sentinel so a
    /// separate process can detect that a shutdown was requested. Does not
    /// forcibly terminate in-flight subprocesses.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let signal = StopSignal {
            stop: true,
            timestamp: Utc::now().to_rfc3339(),
        };
        if let Err(err) = write_json(&self.stop_signal_path(), &signal) {
            warn!("failed to write stop signal file: {err}");
        }
    }

    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Waits up to `deadline` for every Worker to exit, then removes the
    /// liveness snapshot. Never hard-kills a Worker task.
    pub async fn join(mut self, deadline: StdDuration) {
        if let Some(heartbeat) = self.heartbeat.take() {
            let _ = tokio::time::timeout(deadline, heartbeat).await;
        }
        for handle in self.handles.drain(..) {
            if tokio::time::timeout(deadline, handle).await.is_err() {
                warn!("worker did not exit within the shutdown deadline");
            }
        }
        let _ = std::fs::remove_file(self.worker_threads_path());
        info!("worker manager shut down");
    }
}

fn write_liveness_file(path: &Path, names: &[String]) {
    let liveness = WorkerLiveness {
        active_workers: names.len(),
        threads: names.to_vec(),
        timestamp: Utc::now().to_rfc3339(),
    };
    if let Err(err) = write_json(path, &liveness) {
        warn!("failed to write worker liveness file: {err}");
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> std::io::Result<()> {
    let serialized = serde_json::to_string_pretty(value).expect("status payload is serializable");
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, serialized)?;
    std::fs::rename(&tmp_path, path)
}
