// Generic submit-then-poll primitive.
//
// The first call is immediate. Only non-terminal *results* are retried;
// an error from the request function aborts polling at once.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::Error;

/// Interval and attempt budget for one kind of job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Total calls, including the first.
    pub max_attempts: u32,
}

impl PollConfig {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Worst-case wall time spent sleeping between attempts.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 60)
    }
}

/// Call `request_fn` until `is_terminal` accepts its result.
///
/// Resolves with the first terminal result. After `max_attempts`
/// non-terminal results, fails with [`Error::PollExhausted`].
pub async fn poll_request<T, F, Fut, P>(
    mut request_fn: F,
    is_terminal: P,
    interval: Duration,
    max_attempts: u32,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
    P: Fn(&T) -> bool,
{
    for attempt in 1..=max_attempts {
        let result = request_fn().await?;
        if is_terminal(&result) {
            debug!(attempt, "poll reached terminal result");
            return Ok(result);
        }

        if attempt < max_attempts {
            trace!(attempt, interval_ms = interval.as_secs_f64() * 1000.0, "result not terminal, polling again");
            tokio::time::sleep(interval).await;
        }
    }

    Err(Error::PollExhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn counting(
        terminal_on: u32,
    ) -> (Arc<AtomicU32>, impl FnMut() -> std::future::Ready<Result<u32, Error>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let f = move || {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(Ok(if n >= terminal_on { 100 } else { n }))
        };
        (calls, f)
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_on_third_attempt() {
        let (calls, f) = counting(3);

        let result = poll_request(f, |v| *v == 100, Duration::from_millis(10), 3).await;

        assert_eq!(result.unwrap(), 100);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_when_never_terminal() {
        let (calls, f) = counting(u32::MAX);

        let err = poll_request(f, |v| *v == 100, Duration::from_millis(10), 3)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PollExhausted { attempts: 3 }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate() {
        let (calls, f) = counting(1);
        let start = tokio::time::Instant::now();

        poll_request(f, |v| *v == 100, Duration::from_secs(5), 3)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_abort_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let f = move || {
            c.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err::<u32, _>(Error::Api {
                status: 500,
                message: "boom".into(),
            }))
        };

        let err = poll_request(f, |_| true, Duration::from_millis(10), 5)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Api { status: 500, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn budget_counts_sleeps_between_attempts() {
        let cfg = PollConfig::new(Duration::from_millis(500), 50);
        assert_eq!(cfg.budget(), Duration::from_millis(24_500));
    }
}
