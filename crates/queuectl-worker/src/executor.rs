use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to wait for command: {0}")]
    Wait(#[source] std::io::Error),
}

/// Outcome of running one job's command. `timed_out` is the authoritative
/// signal for a timeout; callers must not infer timeout from `exit_code`,
/// since the platform's own sentinel value there is not portable.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_sec: f64,
    pub timed_out: bool,
}

impl ExecOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Runs one shell command under a wall-clock timeout. Stateless: it neither
/// reads nor writes the job store.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor;

impl Executor {
    pub async fn run(&self, command: &str, timeout: Duration) -> Result<ExecOutcome, ExecutorError> {
        let started = std::time::Instant::now();

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ExecutorError::Spawn)?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => {
                let output = result.map_err(ExecutorError::Wait)?;
                Ok(ExecOutcome {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    duration_sec: started.elapsed().as_secs_f64(),
                    timed_out: false,
                })
            }
            Err(_elapsed) => {
                // `child` is dropped here; `kill_on_drop(true)` tears down the
                // subprocess (and its descendants' stdio pipes) for us.
                Ok(ExecOutcome {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration_sec: started.elapsed().as_secs_f64(),
                    timed_out: true,
                })
            }
        }
    }
}
