use chrono::{DateTime, Duration, Utc};

/// What a failed attempt should do next, decided by `decide`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Attempts have reached `max_retries`; the job becomes `dead`.
    Terminal,
    /// Attempts remain; reschedule the job to run again at this time.
    Reschedule(DateTime<Utc>),
}

/// Decides whether a failed job should be retried or dead-lettered, and
/// when. `attempts_after_increment` is the attempt count *after* the
/// failing attempt has already been counted (the store increments before
/// this is called), so `max_retries=3` yields three total attempts before
/// a job goes to the DLQ, not three retries following an initial attempt.
///
/// Backoff is exponential in the post-increment attempt count:
/// `backoff_base ^ attempts_after_increment` seconds. There is deliberately
/// no cap and no jitter — a job that keeps failing waits longer and longer
/// between attempts until `max_retries` is reached, rather than settling
/// into a fixed retry cadence.
pub fn decide(
    attempts_after_increment: i64,
    max_retries: i64,
    backoff_base: i64,
    now: DateTime<Utc>,
) -> RetryDecision {
    if attempts_after_increment >= max_retries {
        return RetryDecision::Terminal;
    }

    let exponent = u32::try_from(attempts_after_increment).unwrap_or(u32::MAX);
    let delay_seconds = backoff_base.saturating_pow(exponent);
    RetryDecision::Reschedule(now + Duration::seconds(delay_seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn reschedules_with_uncapped_exponential_backoff() {
        let t = now();
        assert_eq!(
            decide(1, 5, 2, t),
            RetryDecision::Reschedule(t + Duration::seconds(2))
        );
        assert_eq!(
            decide(2, 5, 2, t),
            RetryDecision::Reschedule(t + Duration::seconds(4))
        );
        assert_eq!(
            decide(3, 5, 2, t),
            RetryDecision::Reschedule(t + Duration::seconds(8))
        );
        // Grows well past any fixed cap a capped policy would impose.
        assert_eq!(
            decide(10, 20, 2, t),
            RetryDecision::Reschedule(t + Duration::seconds(1024))
        );
    }

    #[test]
    fn goes_terminal_once_attempts_reach_max_retries() {
        let t = now();
        assert_eq!(decide(3, 3, 2, t), RetryDecision::Terminal);
        assert_eq!(decide(4, 3, 2, t), RetryDecision::Terminal);
    }
}
