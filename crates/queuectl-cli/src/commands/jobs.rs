use std::path::Path;

use console::style;
use queuectl_shared::{Job, JobStatus, Store};

use crate::error::CliError;

pub async fn list(store: &Store, status: Option<&str>) -> Result<(), CliError> {
    let status = status.map(parse_status).transpose()?;
    let jobs = store.list_by_status(status).await?;
    print_table(&jobs);
    Ok(())
}

pub async fn dlq_list(store: &Store) -> Result<(), CliError> {
    let jobs = store.list_by_status(Some(JobStatus::Dead)).await?;
    print_table(&jobs);
    Ok(())
}

pub async fn dlq_retry(store: &Store, id: &str) -> Result<(), CliError> {
    let now = chrono::Utc::now();
    store.reset_attempts(id, now).await?;
    println!(
        "{} job {} returned to the pending queue",
        style("✓").green().bold(),
        style(id).cyan()
    );
    Ok(())
}

pub async fn dlq_purge(store: &Store, confirm: bool) -> Result<(), CliError> {
    if !confirm {
        return Err(CliError::ConfirmationRequired);
    }
    let purged = store.purge_dead().await?;
    println!(
        "{} purged {} dead-lettered job(s)",
        style("✓").green().bold(),
        purged
    );
    Ok(())
}

pub async fn status(store: &Store, state_dir: &Path) -> Result<(), CliError> {
    let summary = store.summary().await?;
    println!("{}", style("Job summary").cyan().bold());
    println!("  pending:    {}", summary.pending);
    println!("  processing: {}", summary.processing);
    println!("  completed:  {}", summary.completed);
    println!("  failed:     {}", summary.failed);
    println!("  dead:       {}", summary.dead);
    println!();

    let threads_path = state_dir.join("worker_threads.json");
    match std::fs::read_to_string(&threads_path) {
        Ok(contents) => {
            println!("{}", style("Workers").cyan().bold());
            println!("{contents}");
        }
        Err(_) => println!("{}", style("No workers currently running").dim()),
    }

    let stop_path = state_dir.join("stop_signal.json");
    if let Ok(contents) = std::fs::read_to_string(&stop_path) {
        println!("{}", style("Stop signal present").yellow().bold());
        println!("{contents}");
    }

    Ok(())
}

fn parse_status(raw: &str) -> Result<JobStatus, CliError> {
    JobStatus::from_db(raw).map_err(|_| {
        CliError::InvalidJobDescriptor(format!(
            "unknown status \"{raw}\" (expected pending, processing, completed, failed, or dead)"
        ))
    })
}

fn print_table(jobs: &[Job]) {
    println!(
        "{:<36} {:<10} {:<8} {:<8} {}",
        "ID", "STATUS", "PRIORITY", "ATTEMPTS", "CREATED_AT"
    );
    println!("{}", style("-".repeat(90)).dim());
    for job in jobs {
        let status = match job.status {
            JobStatus::Pending => style(job.status.as_str()).yellow(),
            JobStatus::Processing => style(job.status.as_str()).blue(),
            JobStatus::Completed => style(job.status.as_str()).green(),
            JobStatus::Failed | JobStatus::Dead => style(job.status.as_str()).red(),
        };
        println!(
            "{:<36} {:<10} {:<8} {:<8} {}",
            job.id,
            status,
            job.priority,
            job.attempts,
            job.created_at.to_rfc3339()
        );
    }
    if jobs.is_empty() {
        println!("{}", style("(no jobs)").dim());
    }
}
