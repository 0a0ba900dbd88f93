use chrono::{DateTime, Utc};
use console::style;
use queuectl_shared::{ConfigStore, Store};
use serde::Deserialize;
use tracing::warn;

use crate::error::CliError;

/// Shape of the `enqueue <json>` argument. Only `command` is required;
/// everything else defaults from configuration or sensible constants, the
/// way the original `enqueue.py` did.
#[derive(Debug, Deserialize)]
struct JobDescriptor {
    id: Option<String>,
    command: Option<String>,
    max_retries: Option<i64>,
    priority: Option<i64>,
    run_at: Option<String>,
}

pub async fn run(json: &str, store: &Store, config: &ConfigStore) -> Result<(), CliError> {
    let descriptor: JobDescriptor = serde_json::from_str(json)
        .map_err(|err| CliError::InvalidJobDescriptor(format!("malformed JSON: {err}")))?;

    let command = descriptor
        .command
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| CliError::InvalidJobDescriptor("\"command\" is required".to_string()))?;

    let id = descriptor
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let max_retries = descriptor.max_retries.unwrap_or(config.max_retries());
    let priority = descriptor.priority.unwrap_or(0);
    let now = Utc::now();
    let run_at = descriptor
        .run_at
        .as_deref()
        .map(|raw| parse_run_at(raw, now))
        .unwrap_or(now);

    let job = store
        .add(&id, &command, max_retries, priority, run_at, now)
        .await?;

    println!(
        "{} job {} enqueued (run_at={})",
        style("✓").green().bold(),
        style(&job.id).cyan(),
        job.run_at.to_rfc3339()
    );
    Ok(())
}

fn parse_run_at(raw: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return naive.and_utc();
    }
    warn!(raw, "could not parse run_at, defaulting to now");
    now
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_at_accepts_rfc3339() {
        let now = Utc::now();
        let parsed = parse_run_at("2026-03-01T12:00:00Z", now);
        assert_eq!(parsed.to_rfc3339(), "2026-03-01T12:00:00+00:00");
    }

    #[test]
    fn parse_run_at_falls_back_to_now_on_garbage() {
        let now = Utc::now();
        let parsed = parse_run_at("not-a-date", now);
        assert_eq!(parsed, now);
    }
}
