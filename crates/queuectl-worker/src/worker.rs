use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

use queuectl_shared::{Clock, ConfigStore, Store};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::executor::Executor;
use crate::logs::LogWriter;
use crate::retry::{self, RetryDecision};

const IDLE_POLL_INTERVAL: StdDuration = StdDuration::from_secs(1);
const INTER_JOB_INTERVAL: StdDuration = StdDuration::from_millis(200);

/// One long-lived loop: claim, execute, apply the outcome, repeat. Runs as
/// a single `tokio` task; `N` of these make up a `WorkerManager`.
pub struct Worker {
    pub name: String,
    store: Store,
    executor: Executor,
    clock: Arc<dyn Clock>,
    config: Arc<RwLock<ConfigStore>>,
    log_writer: LogWriter,
    cancel: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(
        name: String,
        store: Store,
        executor: Executor,
        clock: Arc<dyn Clock>,
        config: Arc<RwLock<ConfigStore>>,
        log_writer: LogWriter,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name,
            store,
            executor,
            clock,
            config,
            log_writer,
            cancel,
        }
    }

    pub async fn run(self) {
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                info!(worker = %self.name, "worker exiting on cancellation");
                return;
            }

            let now = self.clock.now_utc();
            let claimed = match self.store.claim_next(now).await {
                Ok(claimed) => claimed,
                Err(err) => {
                    error!(worker = %self.name, "failed to claim next job: {err}");
                    tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                    continue;
                }
            };

            let Some(job) = claimed else {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                continue;
            };

            let attempt = job.attempts + 1;
            let job_timeout = {
                let config = self.config.read().await;
                StdDuration::from_secs(config.job_timeout().max(0) as u64)
            };

            if let Err(err) = self
                .log_writer
                .write_header(&job.id, &job.command, attempt, now)
            {
                warn!(worker = %self.name, job_id = %job.id, "failed to write job log header: {err}");
            }

            let outcome = self.executor.run(&job.command, job_timeout).await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(worker = %self.name, job_id = %job.id, "executor failed to run job: {err}");
                    self.handle_failure(&job.id).await;
                    self.idle_unless_cancelled().await;
                    continue;
                }
            };

            if let Err(err) = self.log_writer.write_outcome(&job.id, &outcome) {
                warn!(worker = %self.name, job_id = %job.id, "failed to write job log outcome: {err}");
            }

            if outcome.succeeded() {
                let completed_at = self.clock.now_utc();
                if let Err(err) = self.store.mark_completed(&job.id, completed_at).await {
                    error!(worker = %self.name, job_id = %job.id, "failed to mark job completed: {err}");
                } else {
                    info!(worker = %self.name, job_id = %job.id, "job completed");
                }
            } else {
                if outcome.timed_out {
                    warn!(worker = %self.name, job_id = %job.id, timeout_sec = job_timeout.as_secs(), "job timed out");
                } else {
                    warn!(worker = %self.name, job_id = %job.id, exit_code = outcome.exit_code, "job exited non-zero");
                }
                self.handle_failure(&job.id).await;
            }

            self.idle_unless_cancelled().await;
        }
    }

    /// Increments attempts, consults the retry policy, and either
    /// reschedules or dead-letters the job. Any store error in this path
    /// forces `mark_dead` as a safety fallback, so a job can never loop
    /// forever on persistent store trouble.
    async fn handle_failure(&self, job_id: &str) {
        let now = self.clock.now_utc();

        let result: Result<(), queuectl_shared::StoreError> = async {
            let attempts = self.store.increment_attempts(job_id, now).await?;
            let job = self.store.get(job_id).await?;
            let backoff_base = self.config.read().await.backoff_base();

            match retry::decide(attempts, job.max_retries, backoff_base, now) {
                RetryDecision::Terminal => {
                    self.store.mark_dead(job_id, now).await?;
                    warn!(worker = %self.name, job_id = %job_id, attempts, "job dead-lettered");
                }
                RetryDecision::Reschedule(next_run_at) => {
                    self.store.reschedule(job_id, next_run_at, now).await?;
                    info!(worker = %self.name, job_id = %job_id, attempts, next_run_at = %next_run_at, "job rescheduled");
                }
            }
            Ok(())
        }
        .await;

        if let Err(err) = result {
            error!(worker = %self.name, job_id = %job_id, "failure handling itself failed, forcing job dead: {err}");
            if let Err(fallback_err) = self.store.mark_dead(job_id, now).await {
                error!(worker = %self.name, job_id = %job_id, "fallback mark_dead also failed: {fallback_err}");
            }
        }
    }

    async fn idle_unless_cancelled(&self) {
        if self.cancel.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(INTER_JOB_INTERVAL).await;
    }
}
