use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Status a job occupies in its lifecycle. `Failed` is carried for schema
/// compatibility but is never produced by the current worker loop — every
/// non-zero exit and every timeout routes through the retry/DLQ path
/// instead, so it always lands on `Processing`, `Pending`, `Completed`, or
/// `Dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }

    pub fn from_db(value: &str) -> Result<Self, StoreError> {
        match value {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "dead" => Ok(Self::Dead),
            other => Err(StoreError::InvalidData(format!(
                "unknown job status persisted: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single persisted job row. See `Store` for the operations that create
/// and transition it.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub status: JobStatus,
    pub attempts: i64,
    pub max_retries: i64,
    pub priority: i64,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Counts of jobs grouped by status, as produced by `Store::summary`.
#[derive(Debug, Clone, Default)]
pub struct JobSummary {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub dead: i64,
}

impl JobSummary {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.completed + self.failed + self.dead
    }
}
