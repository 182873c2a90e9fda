//! Transport resilience policy
//!
//! Every remote call goes through a retry policy: a failed request is
//! retried a fixed number of times with exponential backoff, the delay
//! doubling on each attempt. [`RetryingClient`] applies the policy to any
//! [`IndexClient`], so the partitioning and export logic never deal with
//! transient failures themselves.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::filter::RangeFilter;

use super::{DocumentPages, FetchRequest, IndexClient};

/// Retry attempts and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay unit; retry `n` waits `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `operation` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= self.max_retries => {
                    if self.max_retries == 0 {
                        return Err(e);
                    }
                    return Err(TransportError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(e),
                    }
                    .into());
                }
                Err(e) => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        what,
                        attempt,
                        self.max_retries + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// [`IndexClient`] decorator applying a [`RetryPolicy`] to every request.
///
/// Retries cover starting a fetch; pages of a started fetch are not
/// replayed, since result sequences cannot be restarted.
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: IndexClient> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: IndexClient> IndexClient for RetryingClient<C> {
    fn endpoint(&self) -> String {
        self.inner.endpoint()
    }

    fn index_name(&self) -> String {
        self.inner.index_name()
    }

    fn max_result_window(&self) -> u64 {
        self.inner.max_result_window()
    }

    async fn count(&self, filter: Option<&RangeFilter>) -> Result<u64> {
        let what = match filter {
            Some(f) => format!("count '{f}'"),
            None => "count".to_string(),
        };
        self.policy.run(&what, || self.inner.count(filter)).await
    }

    async fn paged_fetch(&self, request: FetchRequest) -> Result<Box<dyn DocumentPages>> {
        let what = format!("fetch '{}'", request.filter);
        debug!("Starting {}", what);
        self.policy
            .run(&what, || self.inner.paged_fetch(request.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryIndexClient;
    use crate::error::{ConfigError, ExportError};
    use mongodb::bson::doc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let memory = MemoryIndexClient::new("idx", vec![doc! { "n": 1_i64 }]);
        memory.fail_next_counts(2);
        let client = RetryingClient::new(memory, fast(4));

        assert_eq!(client.count(None).await.unwrap(), 1);
        assert_eq!(client.inner().count_queries(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_permanent() {
        let memory = MemoryIndexClient::new("idx", vec![]);
        memory.fail_next_counts(10);
        let client = RetryingClient::new(memory, fast(2));

        let err = client.count(None).await.unwrap_err();
        assert!(matches!(
            err,
            ExportError::Transport(TransportError::RetriesExhausted { attempts: 3, .. })
        ));
        assert!(!err.is_transient());
        assert_eq!(client.inner().count_queries(), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast(5)
            .run("validate", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), ExportError>(ConfigError::MissingField("x".into()).into()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
