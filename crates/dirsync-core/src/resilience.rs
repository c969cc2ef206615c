//! Bounded retry for transient collaborator errors.
//!
//! Only errors classified as transient by
//! [`SyncError::is_transient`](crate::error::SyncError::is_transient) are
//! retried; anything else is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::SyncResult;
use crate::traits::ContentStore;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// Delay multiplied by `multiplier` after each retry, capped at `max_delay`.
    Exponential { multiplier: f64, max_delay: Duration },
}

/// Retry policy with a bounded number of attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delay: Duration::from_millis(500),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Exponential {
                multiplier: 2.0,
                max_delay,
            },
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    fn delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential {
                multiplier,
                max_delay,
            } => {
                let base = self.delay.as_millis() as f64 * multiplier.powi(retry as i32);
                let capped = base.min(max_delay.as_millis() as f64);
                Duration::from_millis(capped as u64)
            }
        }
    }

    /// Execute an operation with retries.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_transient() || attempt >= attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_for(attempt - 1);
                    debug!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// [`ContentStore`] wrapper that retries transient failures of every
/// operation under one [`RetryPolicy`].
pub struct RetryingContentStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: ContentStore> RetryingContentStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn with_defaults(inner: S) -> Self {
        Self::new(inner, RetryPolicy::default())
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<S: ContentStore> ContentStore for RetryingContentStore<S> {
    async fn ensure_folder(&self, path: &str) -> SyncResult<()> {
        let inner = &self.inner;
        self.policy.execute(move || inner.ensure_folder(path)).await
    }

    async fn add_file(&self, folder: &str, name: &str, content: &[u8]) -> SyncResult<()> {
        let inner = &self.inner;
        self.policy
            .execute(move || inner.add_file(folder, name, content))
            .await
    }

    async fn check_out(&self, path: &str) -> SyncResult<()> {
        let inner = &self.inner;
        self.policy.execute(move || inner.check_out(path)).await
    }

    async fn check_in(&self, path: &str, comment: &str) -> SyncResult<()> {
        let inner = &self.inner;
        self.policy
            .execute(move || inner.check_in(path, comment))
            .await
    }

    async fn publish(&self, path: &str, comment: &str) -> SyncResult<()> {
        let inner = &self.inner;
        self.policy
            .execute(move || inner.publish(path, comment))
            .await
    }

    async fn approve(&self, path: &str, comment: &str) -> SyncResult<()> {
        let inner = &self.inner;
        self.policy
            .execute(move || inner.approve(path, comment))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let calls = AtomicUsize::new(0);
        let result = quick(3)
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, SyncError>(7) }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = quick(4)
            .execute(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(SyncError::NotFoundYet {
                            path: "Style Library/site.css".into(),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let result: SyncResult<()> = quick(3)
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(SyncError::TargetUnavailable {
                        message: "503".into(),
                    })
                }
            })
            .await;

        assert_eq!(result.unwrap_err().error_code(), "TARGET_UNAVAILABLE");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: SyncResult<()> = quick(5)
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SyncError::invalid_configuration("bad folder")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::exponential(
            10,
            Duration::from_millis(100),
            Duration::from_millis(500),
        );
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5), Duration::from_millis(500));
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay, Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
    }

    /// Content store whose folder creation is not visible for the first
    /// `pending` calls.
    #[derive(Default)]
    struct LaggingStore {
        pending: Mutex<usize>,
        calls: Mutex<Vec<String>>,
    }

    impl LaggingStore {
        fn lagging(pending: usize) -> Self {
            Self {
                pending: Mutex::new(pending),
                calls: Mutex::default(),
            }
        }

        fn step(&self, call: String) -> SyncResult<()> {
            self.calls.lock().unwrap().push(call.clone());
            let mut pending = self.pending.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                return Err(SyncError::NotFoundYet { path: call });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ContentStore for LaggingStore {
        async fn ensure_folder(&self, path: &str) -> SyncResult<()> {
            self.step(format!("ensure_folder {path}"))
        }

        async fn add_file(&self, folder: &str, name: &str, _content: &[u8]) -> SyncResult<()> {
            self.step(format!("add_file {folder}/{name}"))
        }

        async fn check_out(&self, path: &str) -> SyncResult<()> {
            self.step(format!("check_out {path}"))
        }

        async fn check_in(&self, path: &str, _comment: &str) -> SyncResult<()> {
            self.step(format!("check_in {path}"))
        }

        async fn publish(&self, path: &str, _comment: &str) -> SyncResult<()> {
            self.step(format!("publish {path}"))
        }

        async fn approve(&self, path: &str, _comment: &str) -> SyncResult<()> {
            self.step(format!("approve {path}"))
        }
    }

    #[tokio::test]
    async fn test_content_store_retries_not_found_yet() {
        let store = RetryingContentStore::new(LaggingStore::lagging(2), quick(4));

        store.ensure_folder("Style Library/Branding").await.unwrap();
        store
            .add_file("Style Library/Branding", "site.css", b"body{}")
            .await
            .unwrap();

        let calls = store.inner().calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "ensure_folder Style Library/Branding",
                "ensure_folder Style Library/Branding",
                "ensure_folder Style Library/Branding",
                "add_file Style Library/Branding/site.css",
            ]
        );
    }

    #[tokio::test]
    async fn test_content_store_surfaces_exhausted_retries() {
        let store = RetryingContentStore::new(LaggingStore::lagging(10), quick(2));
        let err = store.publish("Pages/home.aspx", "sync").await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND_YET");
        assert_eq!(store.inner().calls.lock().unwrap().len(), 2);
    }
}
