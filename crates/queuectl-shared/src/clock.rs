use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Source of truth for "now" used by the store's `run_at` gating and by the
/// retry policy's backoff scheduling. Injectable so tests can assert exact
/// timestamps without sleeping real time.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for deterministic tests of `run_at` gating and backoff
/// scheduling. Shareable across threads via `Arc`.
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, value: DateTime<Utc>) {
        *self.inner.lock().expect("manual clock lock poisoned") = value;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.inner.lock().expect("manual clock lock poisoned");
        *guard += duration;
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.inner.lock().expect("manual clock lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_by_duration() {
        let start = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ManualClock::new(start);
        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(clock.now_utc(), start + chrono::Duration::seconds(30));
    }
}
