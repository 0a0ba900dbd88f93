use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tracing::info;

use crate::error::StoreError;

mod jobs;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Sole custodian of job state. A single physical connection backs the
/// pool: this is a single-node local queue, and serializing every write
/// through one connection (plus WAL mode) is what gives `claim_next` its
/// atomicity without needing `FOR UPDATE SKIP LOCKED`.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path = %database_path, "store opened");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                command TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                run_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_jobs_claim
             ON jobs (status, priority DESC, run_at ASC, created_at ASC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let _: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

pub(crate) fn format_timestamp(value: chrono::DateTime<chrono::Utc>) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(value: &str) -> Result<chrono::DateTime<chrono::Utc>, StoreError> {
    chrono::NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|err| StoreError::InvalidData(format!("invalid persisted timestamp: {err}")))
}
