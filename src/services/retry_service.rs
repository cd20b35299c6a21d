//! Resilient execution of remote mutations.
//!
//! Transient failures (network, timeout, 5xx) are retried with exponential
//! backoff from a 1 s base, default 3 retries (1 s, 2 s, 4 s). Everything else
//! fails on the first attempt. After a final failure the operation stays armed
//! so it can be replayed once by hand.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryConfig {
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        base_delay: Duration::from_secs(1),
    };

    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// `base_delay * 2^attempt`, attempt being 0-indexed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Reported to observers before each backoff sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryProgress {
    /// 1-based number of the retry about to happen.
    pub attempt: u32,
    pub max_retries: u32,
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryState {
    #[default]
    Idle,
    Retrying { attempt: u32, max_retries: u32 },
    Failed { kind: ErrorKind },
    Succeeded,
}

impl RetryState {
    pub fn can_retry_manually(&self) -> bool {
        matches!(self, RetryState::Failed { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, RetryState::Retrying { .. })
    }
}

/// Progress hooks. All methods default to no-ops.
pub trait RetryObserver<T>: Send + Sync {
    fn on_retry(&self, _progress: RetryProgress) {}
    fn on_success(&self, _value: &T) {}
    fn on_error(&self, _error: &Error) {}
}

pub struct NoopObserver;

impl<T> RetryObserver<T> for NoopObserver {}

type Operation<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

struct Inner<T> {
    state: RetryState,
    last_failed: Option<Operation<T>>,
}

/// Runs one logical operation at a time; clones share state.
pub struct RetryExecutor<T> {
    config: RetryConfig,
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for RetryExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> RetryExecutor<T> {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: RetryState::Idle,
                last_failed: None,
            })),
        }
    }

    pub fn config(&self) -> RetryConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A poisoned lock only means an observer panicked mid-update; the state is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> RetryState {
        self.lock().state.clone()
    }

    pub fn can_retry_manually(&self) -> bool {
        let inner = self.lock();
        inner.state.can_retry_manually() && inner.last_failed.is_some()
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = RetryState::Idle;
        inner.last_failed = None;
    }

    fn set_state(&self, state: RetryState) {
        self.lock().state = state;
    }

    /// Runs `operation`, retrying transient failures with backoff.
    pub async fn execute<F, Fut>(&self, operation: F, observer: &dyn RetryObserver<T>) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let operation: Operation<T> = Arc::new(move || operation().boxed());
        {
            let mut inner = self.lock();
            inner.last_failed = None;
            inner.state = RetryState::Idle;
        }

        let max_retries = self.config.max_retries;
        let mut attempt = 0;
        let error = loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                    }
                    self.set_state(RetryState::Succeeded);
                    observer.on_success(&value);
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::debug!(error = %e, kind = %e.kind(), "non-retryable failure");
                    break e;
                }
                Err(e) if attempt >= max_retries => {
                    tracing::warn!(error = %e, attempts = attempt + 1, "retries exhausted");
                    break e;
                }
                Err(e) => {
                    let delay = self.config.delay_for_attempt(attempt);
                    attempt += 1;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying"
                    );
                    self.set_state(RetryState::Retrying {
                        attempt,
                        max_retries,
                    });
                    observer.on_retry(RetryProgress {
                        attempt,
                        max_retries,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                }
            }
        };

        {
            let mut inner = self.lock();
            inner.state = RetryState::Failed { kind: error.kind() };
            inner.last_failed = Some(operation);
        }
        observer.on_error(&error);
        Err(error)
    }

    /// Replays the last failed operation exactly once, without backoff.
    pub async fn retry_manually(&self, observer: &dyn RetryObserver<T>) -> Result<T> {
        let operation = {
            let mut inner = self.lock();
            match inner.last_failed.take() {
                Some(op) if inner.state.can_retry_manually() => {
                    inner.state = RetryState::Idle;
                    op
                }
                other => {
                    inner.last_failed = other;
                    return Err(Error::Validation(
                        "There is no failed operation to retry".to_string(),
                    ));
                }
            }
        };

        tracing::info!("manual retry of last failed operation");
        match operation().await {
            Ok(value) => {
                self.set_state(RetryState::Succeeded);
                observer.on_success(&value);
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(error = %e, "manual retry failed");
                {
                    let mut inner = self.lock();
                    inner.state = RetryState::Failed { kind: e.kind() };
                    inner.last_failed = Some(operation);
                }
                observer.on_error(&e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Recorder {
        retries: Mutex<Vec<RetryProgress>>,
        successes: AtomicU32,
        errors: AtomicU32,
    }

    impl RetryObserver<u32> for Recorder {
        fn on_retry(&self, progress: RetryProgress) {
            self.retries.lock().unwrap().push(progress);
        }
        fn on_success(&self, _value: &u32) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_error(&self, _error: &Error) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn server_error() -> Error {
        Error::Server {
            status: 503,
            message: "unavailable".into(),
        }
    }

    /// Fails with `make_err` for the first `failures` calls, then returns the call number.
    fn flaky(
        failures: u32,
        make_err: fn() -> Error,
    ) -> (Arc<AtomicU32>, impl Fn() -> BoxFuture<'static, Result<u32>> + Send + Sync) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let op = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= failures {
                    Err(make_err())
                } else {
                    Ok(n)
                }
            }
            .boxed()
        };
        (calls, op)
    }

    #[test]
    fn delays_double_from_base() {
        let config = RetryConfig::default();
        let delays: Vec<_> = config.delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let executor = RetryExecutor::new(RetryConfig::default());
        let recorder = Recorder::default();
        let (calls, op) = flaky(2, server_error);

        let value = executor.execute(op, &recorder).await.unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let retries = recorder.retries.lock().unwrap().clone();
        assert_eq!(retries.len(), 2);
        assert_eq!(retries[0].attempt, 1);
        assert_eq!(retries[0].delay, Duration::from_millis(1000));
        assert_eq!(retries[1].attempt, 2);
        assert_eq!(retries[1].delay, Duration::from_millis(2000));
        assert_eq!(recorder.successes.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 0);
        assert_eq!(executor.state(), RetryState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_fails_on_first_attempt() {
        let executor = RetryExecutor::new(RetryConfig::default());
        let recorder = Recorder::default();
        let (calls, op) = flaky(u32::MAX, || Error::Validation("bad rating".into()));

        let err = executor.execute(op, &recorder).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(recorder.retries.lock().unwrap().is_empty());
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_arms_manual_retry() {
        let executor = RetryExecutor::new(RetryConfig::default());
        let recorder = Recorder::default();
        let (calls, op) = flaky(4, server_error);

        let err = executor.execute(op, &recorder).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerError);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(recorder.retries.lock().unwrap().len(), 3);
        assert!(executor.can_retry_manually());
        assert_eq!(
            executor.state(),
            RetryState::Failed {
                kind: ErrorKind::ServerError
            }
        );

        let value = executor.retry_manually(&recorder).await.unwrap();
        assert_eq!(value, 5);
        assert!(!executor.can_retry_manually());
        assert_eq!(executor.state(), RetryState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_manual_retry_rearms() {
        let executor = RetryExecutor::new(RetryConfig::new(0, Duration::from_millis(10)));
        let (calls, op) = flaky(2, server_error);

        assert!(executor.execute(op, &NoopObserver).await.is_err());
        assert!(executor.retry_manually(&NoopObserver).await.is_err());
        assert!(executor.can_retry_manually());
        assert_eq!(executor.retry_manually(&NoopObserver).await.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn manual_retry_without_failure_is_rejected() {
        let executor: RetryExecutor<u32> = RetryExecutor::new(RetryConfig::default());
        let err = executor.retry_manually(&NoopObserver).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
