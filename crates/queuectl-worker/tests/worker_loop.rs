use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use queuectl_shared::{ConfigStore, ManualClock, Store, SystemClock};
use queuectl_worker::{Executor, LogWriter, Worker};
use tokio::sync::RwLock;

async fn new_store() -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("queuectl.db");
    let store = Store::connect(db_path.to_str().unwrap()).await.unwrap();
    (store, dir)
}

#[tokio::test]
async fn worker_completes_a_successful_job_then_exits_on_cancellation() {
    let (store, dir) = new_store().await;
    let now = chrono::Utc::now();
    store.add("job-1", "echo hi", 3, 0, now, now).await.unwrap();

    let config = Arc::new(RwLock::new(
        ConfigStore::load(dir.path().join("config.json")).unwrap(),
    ));
    let cancel = Arc::new(AtomicBool::new(false));
    let worker = Worker::new(
        "Worker-1".to_string(),
        store.clone(),
        Executor,
        Arc::new(SystemClock),
        config,
        LogWriter::new(dir.path().join("logs")),
        cancel.clone(),
    );

    let handle = tokio::spawn(worker.run());
    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.store(true, std::sync::atomic::Ordering::SeqCst);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker did not exit after cancellation")
        .unwrap();

    let job = store.get("job-1").await.unwrap();
    assert_eq!(job.status.as_str(), "completed");
}

#[tokio::test]
async fn worker_dead_letters_a_job_once_max_retries_is_reached() {
    let (store, dir) = new_store().await;
    let now = chrono::Utc::now();
    store
        .add("job-fail", "exit 1", 1, 0, now, now)
        .await
        .unwrap();

    let mut config_store = ConfigStore::load(dir.path().join("config.json")).unwrap();
    config_store.set("backoff_base", "1").unwrap();
    let config = Arc::new(RwLock::new(config_store));
    let cancel = Arc::new(AtomicBool::new(false));
    let worker = Worker::new(
        "Worker-1".to_string(),
        store.clone(),
        Executor,
        Arc::new(SystemClock),
        config,
        LogWriter::new(dir.path().join("logs")),
        cancel.clone(),
    );

    let handle = tokio::spawn(worker.run());
    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel.store(true, std::sync::atomic::Ordering::SeqCst);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker did not exit after cancellation")
        .unwrap();

    let job = store.get("job-fail").await.unwrap();
    assert_eq!(job.status.as_str(), "dead");
    assert_eq!(job.attempts, 1);
}

fn fixed_start() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc)
}

/// Drives run_at gating through a `ManualClock` instead of sleeping real
/// wall time: the job's `run_at` is ten minutes out, and the worker must
/// leave it `pending` until the clock is advanced past it.
#[tokio::test]
async fn worker_defers_a_job_until_its_run_at_then_claims_it_once_the_clock_advances() {
    let (store, dir) = new_store().await;
    let start = fixed_start();
    let run_at = start + chrono::Duration::minutes(10);
    store.add("job-future", "echo hi", 3, 0, run_at, start).await.unwrap();

    let clock = ManualClock::new(start);
    let config = Arc::new(RwLock::new(
        ConfigStore::load(dir.path().join("config.json")).unwrap(),
    ));
    let cancel = Arc::new(AtomicBool::new(false));
    let worker = Worker::new(
        "Worker-1".to_string(),
        store.clone(),
        Executor,
        Arc::new(clock.clone()),
        config,
        LogWriter::new(dir.path().join("logs")),
        cancel.clone(),
    );

    let handle = tokio::spawn(worker.run());
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(store.get("job-future").await.unwrap().status.as_str(), "pending");

    clock.advance(chrono::Duration::minutes(11));
    tokio::time::sleep(Duration::from_millis(1200)).await;
    cancel.store(true, std::sync::atomic::Ordering::SeqCst);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker did not exit after cancellation")
        .unwrap();

    assert_eq!(store.get("job-future").await.unwrap().status.as_str(), "completed");
}

/// Drives exponential backoff rescheduling through a `ManualClock`: a
/// `backoff_base` of 100 would make a real-time sleep impractical, but
/// advancing the clock directly proves the job isn't reclaimed before its
/// scheduled retry time and is reclaimed right after it.
#[tokio::test]
async fn worker_reschedules_with_backoff_and_reclaims_only_once_the_clock_passes_it() {
    let (store, dir) = new_store().await;
    let start = fixed_start();
    store.add("job-retry", "exit 1", 3, 0, start, start).await.unwrap();

    let mut config_store = ConfigStore::load(dir.path().join("config.json")).unwrap();
    config_store.set("backoff_base", "100").unwrap();
    let config = Arc::new(RwLock::new(config_store));
    let clock = ManualClock::new(start);
    let cancel = Arc::new(AtomicBool::new(false));
    let worker = Worker::new(
        "Worker-1".to_string(),
        store.clone(),
        Executor,
        Arc::new(clock.clone()),
        config,
        LogWriter::new(dir.path().join("logs")),
        cancel.clone(),
    );

    let handle = tokio::spawn(worker.run());
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let job = store.get("job-retry").await.unwrap();
    assert_eq!(job.status.as_str(), "pending");
    assert_eq!(job.attempts, 1);
    // backoff_base^1 == 100 seconds out; well short of that shouldn't be claimed again.
    clock.advance(chrono::Duration::seconds(50));
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let job = store.get("job-retry").await.unwrap();
    assert_eq!(job.status.as_str(), "pending");
    assert_eq!(job.attempts, 1);

    clock.advance(chrono::Duration::seconds(60));
    tokio::time::sleep(Duration::from_millis(1200)).await;
    cancel.store(true, std::sync::atomic::Ordering::SeqCst);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker did not exit after cancellation")
        .unwrap();

    let job = store.get("job-retry").await.unwrap();
    assert_eq!(job.attempts, 2);
}
