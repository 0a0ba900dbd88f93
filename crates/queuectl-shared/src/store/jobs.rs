use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::info;

use crate::error::StoreError;
use crate::job::{Job, JobStatus, JobSummary};

use super::{Store, format_timestamp, parse_timestamp};

impl Store {
    pub async fn add(
        &self,
        id: &str,
        command: &str,
        max_retries: i64,
        priority: i64,
        run_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Job, StoreError> {
        let run_at_str = format_timestamp(run_at);
        let now_str = format_timestamp(now);

        let result = sqlx::query(
            "INSERT INTO jobs
                (id, command, status, attempts, max_retries, priority, run_at, created_at, updated_at)
             VALUES (?, ?, 'pending', 0, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(command)
        .bind(max_retries)
        .bind(priority)
        .bind(&run_at_str)
        .bind(&now_str)
        .bind(&now_str)
        .execute(&self.pool)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &result {
            if db_err.message().contains("UNIQUE constraint failed") {
                return Err(StoreError::DuplicateId(id.to_string()));
            }
        }
        result?;

        self.get(id).await
    }

    pub async fn get(&self, id: &str) -> Result<Job, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        row_to_job(&row)
    }

    pub async fn list_by_status(&self, status: Option<JobStatus>) -> Result<Vec<Job>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query("SELECT * FROM jobs WHERE status = ? ORDER BY created_at DESC")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM jobs ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(row_to_job).collect()
    }

    /// Atomically claims the single highest-priority eligible job: ready
    /// (`status='pending'` and `run_at <= now`), tie-broken by earliest
    /// `run_at` then earliest `created_at`. The `UPDATE ... WHERE id = (SELECT
    /// ...) RETURNING *` shape makes the select-then-claim a single
    /// statement, so two concurrent callers against the same connection can
    /// never both observe the same row as claimable.
    pub async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>, StoreError> {
        let now_str = format_timestamp(now);

        let row = sqlx::query(
            "UPDATE jobs
             SET status = 'processing', updated_at = ?
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE status = 'pending' AND datetime(run_at) <= datetime(?)
                 ORDER BY priority DESC, datetime(run_at) ASC, datetime(created_at) ASC
                 LIMIT 1
             )
             RETURNING *",
        )
        .bind(&now_str)
        .bind(&now_str)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    pub async fn mark_completed(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.set_status(id, JobStatus::Completed, now).await
    }

    pub async fn mark_dead(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.set_status(id, JobStatus::Dead, now).await
    }

    async fn set_status(
        &self,
        id: &str,
        status: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE jobs SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(format_timestamp(now))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Moves a job back to `pending` with a new `run_at`, used after a
    /// failed attempt that still has retries remaining.
    pub async fn reschedule(
        &self,
        id: &str,
        next_run_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE jobs SET status = 'pending', run_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(format_timestamp(next_run_at))
        .bind(format_timestamp(now))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn increment_attempts(&self, id: &str, now: DateTime<Utc>) -> Result<i64, StoreError> {
        sqlx::query("UPDATE jobs SET attempts = attempts + 1, updated_at = ? WHERE id = ?")
            .bind(format_timestamp(now))
            .bind(id)
            .execute(&self.pool)
            .await?;

        let attempts: i64 = sqlx::query_scalar("SELECT attempts FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(attempts)
    }

    /// Resets every currently-`processing` job back to `pending`. Invoked
    /// once at manager startup: the `processing` status is the only lease a
    /// job carries, so a crash mid-execution leaves rows stuck in
    /// `processing` until this runs.
    pub async fn recover_orphans(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE jobs SET status = 'pending', updated_at = ? WHERE status = 'processing'")
            .bind(format_timestamp(now))
            .execute(&self.pool)
            .await?;
        let recovered = result.rows_affected();
        if recovered > 0 {
            info!(recovered, "recovered orphaned processing jobs");
        }
        Ok(recovered)
    }

    pub async fn summary(&self) -> Result<JobSummary, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut summary = JobSummary::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            match JobStatus::from_db(&status)? {
                JobStatus::Pending => summary.pending = count,
                JobStatus::Processing => summary.processing = count,
                JobStatus::Completed => summary.completed = count,
                JobStatus::Failed => summary.failed = count,
                JobStatus::Dead => summary.dead = count,
            }
        }
        Ok(summary)
    }

    pub async fn purge_dead(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE status = 'dead'")
            .execute(&self.pool)
            .await?;
        let purged = result.rows_affected();
        info!(purged, "purged dead-lettered jobs");
        Ok(purged)
    }

    /// Used by `dlq retry`: resets attempts to zero and reinstates the job
    /// as immediately-ready `pending` work.
    pub async fn reset_attempts(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE jobs SET status = 'pending', attempts = 0, run_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(format_timestamp(now))
        .bind(format_timestamp(now))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_job(row: &SqliteRow) -> Result<Job, StoreError> {
    let status: String = row.try_get("status")?;
    let run_at: String = row.try_get("run_at")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Job {
        id: row.try_get("id")?,
        command: row.try_get("command")?,
        status: JobStatus::from_db(&status)?,
        attempts: row.try_get("attempts")?,
        max_retries: row.try_get("max_retries")?,
        priority: row.try_get("priority")?,
        run_at: parse_timestamp(&run_at)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("queuectl.db");
        let store = Store::connect(db_path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let (store, _dir) = test_store().await;
        let now = Utc::now();
        store
            .add("job-1", "echo hi", 3, 0, now, now)
            .await
            .unwrap();

        let job = store.get("job-1").await.unwrap();
        assert_eq!(job.command, "echo hi");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn add_duplicate_id_fails() {
        let (store, _dir) = test_store().await;
        let now = Utc::now();
        store.add("job-1", "echo hi", 3, 0, now, now).await.unwrap();
        let err = store.add("job-1", "echo bye", 3, 0, now, now).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn claim_next_respects_priority_then_run_at() {
        let (store, _dir) = test_store().await;
        let now = Utc::now();
        store.add("low", "echo low", 3, 0, now, now).await.unwrap();
        store.add("high", "echo high", 3, 10, now, now).await.unwrap();

        let claimed = store.claim_next(now).await.unwrap().unwrap();
        assert_eq!(claimed.id, "high");
        assert_eq!(claimed.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn claim_next_skips_future_run_at() {
        let (store, _dir) = test_store().await;
        let now = Utc::now();
        let future = now + Duration::seconds(3600);
        store
            .add("future", "echo later", 3, 0, future, now)
            .await
            .unwrap();

        assert!(store.claim_next(now).await.unwrap().is_none());
        assert!(store.claim_next(future).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn claim_next_is_exclusive_under_concurrent_claims() {
        let (store, _dir) = test_store().await;
        let now = Utc::now();
        store.add("only", "echo hi", 3, 0, now, now).await.unwrap();

        let a = store.claim_next(now).await.unwrap();
        let b = store.claim_next(now).await.unwrap();
        assert!(a.is_some());
        assert!(b.is_none());
    }

    #[tokio::test]
    async fn recover_orphans_resets_processing_rows() {
        let (store, _dir) = test_store().await;
        let now = Utc::now();
        store.add("stuck", "echo hi", 3, 0, now, now).await.unwrap();
        store.claim_next(now).await.unwrap();

        let recovered = store.recover_orphans(now).await.unwrap();
        assert_eq!(recovered, 1);

        let job = store.get("stuck").await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let recovered_again = store.recover_orphans(now).await.unwrap();
        assert_eq!(recovered_again, 0);
    }

    #[tokio::test]
    async fn summary_counts_by_status() {
        let (store, _dir) = test_store().await;
        let now = Utc::now();
        store.add("a", "echo a", 3, 0, now, now).await.unwrap();
        store.add("b", "echo b", 3, 0, now, now).await.unwrap();
        store.claim_next(now).await.unwrap();
        store.mark_completed("a", now).await.unwrap_or(());

        let summary = store.summary().await.unwrap();
        assert_eq!(summary.total(), 2);
    }

    #[tokio::test]
    async fn purge_dead_removes_only_dead_rows() {
        let (store, _dir) = test_store().await;
        let now = Utc::now();
        store.add("alive", "echo hi", 3, 0, now, now).await.unwrap();
        store.add("dead", "exit 1", 3, 0, now, now).await.unwrap();
        store.mark_dead("dead", now).await.unwrap();

        let purged = store.purge_dead().await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get("alive").await.is_ok());
        assert!(matches!(store.get("dead").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn reset_attempts_reinstates_dlq_job() {
        let (store, _dir) = test_store().await;
        let now = Utc::now();
        store.add("dlq-job", "exit 1", 1, 0, now, now).await.unwrap();
        store.claim_next(now).await.unwrap();
        store.increment_attempts("dlq-job", now).await.unwrap();
        store.mark_dead("dlq-job", now).await.unwrap();

        store.reset_attempts("dlq-job", now).await.unwrap();
        let job = store.get("dlq-job").await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
    }
}
