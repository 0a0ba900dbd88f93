use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::executor::ExecOutcome;

/// Append-only per-job log writer: `{log_dir}/{job_id}.log`. Failures here
/// are swallowed by the caller (the Worker loop) — a broken log file must
/// never fail a job.
pub struct LogWriter {
    log_dir: PathBuf,
}

impl LogWriter {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    fn path_for(&self, job_id: &str) -> PathBuf {
        self.log_dir.join(format!("{job_id}.log"))
    }

    pub fn write_header(
        &self,
        job_id: &str,
        command: &str,
        attempt: i64,
        started_at: DateTime<Utc>,
    ) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.log_dir)?;
        let header = format!(
            "=== job {job_id} attempt {attempt} started {started_at} ===\n$ {command}\n"
        );
        append(&self.path_for(job_id), &header)
    }

    pub fn write_outcome(&self, job_id: &str, outcome: &ExecOutcome) -> std::io::Result<()> {
        let mut body = String::new();
        if !outcome.stdout.is_empty() {
            body.push_str("--- stdout ---\n");
            body.push_str(&outcome.stdout);
            if !outcome.stdout.ends_with('\n') {
                body.push('\n');
            }
        }
        if !outcome.stderr.is_empty() {
            body.push_str("--- stderr ---\n");
            body.push_str(&outcome.stderr);
            if !outcome.stderr.ends_with('\n') {
                body.push('\n');
            }
        }
        let status = if outcome.timed_out {
            "TIMED OUT".to_string()
        } else {
            format!("exit code {}", outcome.exit_code)
        };
        body.push_str(&format!(
            "=== {status} in {:.3}s ===\n",
            outcome.duration_sec
        ));
        append(&self.path_for(job_id), &body)
    }

    pub fn path(&self, job_id: &str) -> PathBuf {
        self.path_for(job_id)
    }
}

fn append(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(content.as_bytes())
}
