//! Retry with exponential backoff for transient source failures.

use std::time::{Duration, Instant};

use ce_config::ExportConfig;
use ce_source::SourceError;
use rand::RngExt;
use tracing::warn;

/// Point in time after which no new work is dispatched.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    pub(crate) fn after(timeout: Option<Duration>) -> Self {
        Self(timeout.map(|t| Instant::now() + t))
    }

    pub(crate) fn expired(self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

/// How transient failures are retried. The default makes a single attempt.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RetryPolicy {
    pub(crate) max_retries: u32,
    pub(crate) base_delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn from_config(config: &ExportConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based): the base delay doubled
    /// per attempt, plus up to half of that as jitter.
    pub(crate) fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1 << attempt.saturating_sub(1).min(16));
        let jitter_ms = u64::try_from(exp.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random::<u64>() % (jitter_ms + 1)
        };
        exp + Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds, fails permanently, runs out of retries or
    /// the deadline passes. Returns the last result and the attempts made.
    pub(crate) fn run<T>(
        &self,
        deadline: Deadline,
        page_id: &str,
        mut op: impl FnMut() -> Result<T, SourceError>,
    ) -> (Result<T, SourceError>, u32) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = op();
            let err = match result {
                Ok(value) => return (Ok(value), attempts),
                Err(err) => err,
            };
            if !err.is_transient() || attempts > self.max_retries || deadline.expired() {
                return (Err(err), attempts);
            }
            let delay = self.delay(attempts);
            warn!(
                page_id,
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Transient fetch failure, retrying"
            );
            std::thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use ce_source::SourceErrorKind;
    use pretty_assertions::assert_eq;

    use super::*;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_delay_doubles_with_jitter() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        };
        for attempt in 1..=3 {
            let base = 100 * (1 << (attempt - 1));
            let delay = policy.delay(attempt).as_millis();
            assert!(delay >= base && delay <= base + base / 2, "{delay}");
        }
    }

    #[test]
    fn test_transient_retried_until_success() {
        let mut calls = 0;
        let (result, attempts) = policy(2).run(Deadline::default(), "1", || {
            calls += 1;
            if calls < 3 {
                Err(SourceError::new(SourceErrorKind::Network))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn test_retries_exhausted() {
        let (result, attempts) = policy(1).run(Deadline::default(), "1", || {
            Err::<(), _>(SourceError::new(SourceErrorKind::Timeout))
        });
        assert!(result.is_err());
        assert_eq!(attempts, 2);
    }

    #[test]
    fn test_permanent_not_retried() {
        let (result, attempts) = policy(5).run(Deadline::default(), "1", || {
            Err::<(), _>(SourceError::not_found("1"))
        });
        assert_eq!(result.unwrap_err().kind, SourceErrorKind::NotFound);
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_deadline() {
        assert!(!Deadline::default().expired());
        assert!(Deadline::after(Some(Duration::ZERO)).expired());
        assert!(!Deadline::after(Some(Duration::from_secs(60))).expired());
    }
}
