use std::future::Future;
use std::time::Duration;

use crate::error::Error;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Connectivity failure: retry after the short delay
    Short,

    /// Unexpected failure: retry after the long delay, with the extended attempt budget
    Long,

    /// Retrying cannot help
    Stop,
}

/// Map a failure to the retry behaviour
pub fn classify(error: &Error) -> RetryDecision {
    match error {
        e if e.is_connectivity() => RetryDecision::Short,
        Error::InvalidArgument(_)
        | Error::NotFound(_)
        | Error::CorruptedDependency { .. }
        | Error::Cancelled
        | Error::WorkerStopped => RetryDecision::Stop,
        _ => RetryDecision::Long,
    }
}

/// Bounded retry applied to every remote call.
///
/// Connectivity failures are retried up to `max_attempts` total attempts waiting
/// `connectivity_delay` in between. Any other retryable failure waits `unexpected_delay` and raises
/// the budget of the call to `extended_max_attempts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    extended_max_attempts: u32,
    connectivity_delay: Duration,
    unexpected_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            extended_max_attempts: 10,
            connectivity_delay: Duration::from_secs(3),
            unexpected_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy making a single attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            extended_max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.extended_max_attempts = self.extended_max_attempts.max(self.max_attempts);
        self
    }

    pub fn extended_max_attempts(mut self, extended_max_attempts: u32) -> Self {
        self.extended_max_attempts = extended_max_attempts.max(self.max_attempts);
        self
    }

    pub fn connectivity_delay(mut self, delay: Duration) -> Self {
        self.connectivity_delay = delay;
        self
    }

    pub fn unexpected_delay(mut self, delay: Duration) -> Self {
        self.unexpected_delay = delay;
        self
    }

    /// The delay preceding the next attempt, `None` if the call must give up.
    ///
    /// `attempt` is the number of attempts made so far, `budget` the current attempt ceiling which
    /// is raised by unexpected failures.
    pub fn next_delay(&self, error: &Error, attempt: u32, budget: &mut u32) -> Option<Duration> {
        let delay = match classify(error) {
            RetryDecision::Stop => return None,
            RetryDecision::Short => self.connectivity_delay,
            RetryDecision::Long => {
                *budget = (*budget).max(self.extended_max_attempts);
                self.unexpected_delay
            }
        };
        (attempt < *budget).then_some(delay)
    }

    /// Run `op` until it succeeds or the policy gives up, returning the last error in that case.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 0;
        let mut budget = self.max_attempts;
        loop {
            attempt += 1;
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            match self.next_delay(&error, attempt, &mut budget) {
                Some(delay) => {
                    log::debug!("{what} attempt {attempt}/{budget} failed: {error}, waiting {delay:?}");
                    async_sleep(delay).await;
                }
                None => {
                    log::warn!("{what} failed after {attempt} attempts: {error}");
                    return Err(error);
                }
            }
        }
    }
}

pub async fn async_sleep(delay: Duration) {
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::{classify, RetryDecision, RetryPolicy};
    use crate::error::Error;

    fn failing(
        calls: &AtomicU32,
        failures: u32,
        error: fn() -> Error,
    ) -> impl std::future::Future<Output = Result<u32, Error>> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n <= failures {
                Err(error())
            } else {
                Ok(n)
            }
        }
    }

    fn assert_elapsed(start: tokio::time::Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "elapsed {elapsed:?} expected {expected:?}"
        );
    }

    fn connectivity() -> Error {
        Error::Connectivity("connection refused".into())
    }

    fn unexpected() -> Error {
        Error::Http {
            status: 500,
            body: "oops".into(),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&connectivity()), RetryDecision::Short);
        assert_eq!(classify(&unexpected()), RetryDecision::Long);
        assert_eq!(classify(&Error::Decode("x".into())), RetryDecision::Long);
        assert_eq!(classify(&Error::NotFound("x".into())), RetryDecision::Stop);
        assert_eq!(
            classify(&Error::InvalidArgument("x".into())),
            RetryDecision::Stop
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_retries_then_succeeds() {
        let policy = RetryPolicy::default();
        for n in 1..=3 {
            let calls = AtomicU32::new(0);
            let start = tokio::time::Instant::now();
            let result = policy
                .run("test", || failing(&calls, n - 1, connectivity))
                .await;
            assert_eq!(result.unwrap(), n);
            assert_eq!(calls.load(Ordering::SeqCst), n);
            assert_elapsed(start, Duration::from_secs(3) * (n - 1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_exhausted() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result = policy
            .run("test", || failing(&calls, u32::MAX, connectivity))
            .await;
        assert!(matches!(result, Err(Error::Connectivity(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // no sleep after the last attempt
        assert_elapsed(start, Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_extends_budget() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result = policy
            .run("test", || failing(&calls, u32::MAX, unexpected))
            .await;
        assert!(matches!(result, Err(Error::Http { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_elapsed(start, Duration::from_secs(90));

        let calls = AtomicU32::new(0);
        let result = policy.run("test", || failing(&calls, 5, unexpected)).await;
        assert_eq!(result.unwrap(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_does_not_retry() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result = policy
            .run("test", || {
                failing(&calls, u32::MAX, || Error::NotFound("tx".into()))
            })
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_elapsed(start, Duration::ZERO);
    }

    #[test]
    fn test_builder_keeps_budget_consistent() {
        let policy = RetryPolicy::default().max_attempts(12);
        let mut budget = 12;
        assert!(policy.next_delay(&unexpected(), 11, &mut budget).is_some());
        assert_eq!(budget, 12);
        assert!(policy.next_delay(&unexpected(), 12, &mut budget).is_none());

        let mut budget = 1;
        assert!(RetryPolicy::no_retry()
            .next_delay(&connectivity(), 1, &mut budget)
            .is_none());
    }
}
