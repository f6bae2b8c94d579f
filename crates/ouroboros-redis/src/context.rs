//! Per-call deadline and cancellation

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::StoreError;

/// Timeout and cancellation applied to every store call
///
/// The default context has no timeout and a token nobody cancels, so calls
/// wait for the remote side as long as it takes.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl CallContext {
    /// Create a context without timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every call by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Remove the timeout
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Abort calls when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Context whose token is cancelled together with this one, but can
    /// also be cancelled on its own
    pub fn child(&self) -> Self {
        Self {
            timeout: self.timeout,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel every call running under this context (and its children)
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `fut` under the timeout and cancellation of this context
    pub async fn run<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| StoreError::Timeout(limit))?,
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StoreError::Cancelled),
            result = bounded => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_run_passes_result_through() {
        let ctx = CallContext::new();
        let value = assert_ok!(ctx.run(async { Ok::<_, StoreError>(42) }).await);
        assert_eq!(value, 42);

        let err = assert_err!(
            ctx.run(async { Err::<(), _>(StoreError::Connection("down".to_string())) })
                .await
        );
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(20));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StoreError>(())
            })
            .await;

        match result {
            Err(StoreError::Timeout(limit)) => assert_eq!(limit, Duration::from_millis(20)),
            other => panic!("Expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_is_cancelled() {
        let ctx = CallContext::new();
        let canceller = ctx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StoreError>(())
            })
            .await;

        assert!(matches!(result, Err(StoreError::Cancelled)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_already_cancelled_context_skips_call() {
        let ctx = CallContext::new();
        ctx.cancel();

        let result = ctx.run(async { Ok::<_, StoreError>(1) }).await;
        assert!(matches!(result, Err(StoreError::Cancelled)));
    }

    #[test]
    fn test_child_follows_parent() {
        let parent = CallContext::new().with_timeout(Duration::from_secs(1));
        let child = parent.child();
        assert_eq!(child.timeout(), Some(Duration::from_secs(1)));

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_without_timeout() {
        let ctx = CallContext::new()
            .with_timeout(Duration::from_secs(1))
            .without_timeout();
        assert_eq!(ctx.timeout(), None);
    }
}
