//! Chain Reader seam.
//!
//! Contract reads, price feeds, and wallet RPCs all arrive through the
//! opaque [`ChainReader`] capability. [`ChainClient`] wraps any reader with
//! the engine's call policy: bounded retry with exponential backoff and a
//! hard per-attempt timeout. On exhaustion the call yields "unknown"
//! (`Null`) instead of blocking the pass or surfacing an error; the node
//! that asked decides how to present that to the user.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::ExternalCallError;

/// An opaque, retryable async call surface over the blockchain RPC layer.
pub trait ChainReader: Send + Sync {
    /// Perform one attempt of the named call.
    fn call(&self, method: &str, params: Value) -> BoxFuture<'static, Result<Value, ExternalCallError>>;
}

/// Retry/backoff/timeout policy for external calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts before the call is declared unavailable.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub base_delay: Duration,
    /// Ceiling on the backoff delay.
    pub max_delay: Duration,
    /// Hard timeout applied to each individual attempt.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// A [`ChainReader`] wrapped with the retry policy.
#[derive(Clone)]
pub struct ChainClient {
    reader: Arc<dyn ChainReader>,
    policy: RetryPolicy,
}

impl ChainClient {
    pub fn new(reader: Arc<dyn ChainReader>, policy: RetryPolicy) -> Self {
        Self { reader, policy }
    }

    /// Call with retries; `Null` ("unknown") after the budget is spent.
    ///
    /// This is the form compute functions use: an unavailable read degrades
    /// to a placeholder value, never to a failed node.
    pub async fn call(&self, method: &str, params: Value) -> Value {
        match self.try_call(method, params).await {
            Ok(value) => value,
            Err(error) => {
                warn!(method, %error, "external call unavailable; yielding unknown");
                Value::Null
            }
        }
    }

    /// Call with retries, surfacing the final error.
    pub async fn try_call(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Value, ExternalCallError> {
        let mut delay = self.policy.base_delay;
        let mut last: Option<ExternalCallError> = None;

        for attempt in 1..=self.policy.max_attempts {
            let outcome = timeout(
                self.policy.call_timeout,
                self.reader.call(method, params.clone()),
            )
            .await;

            match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => {
                    debug!(method, attempt, %error, "call attempt failed");
                    last = Some(error);
                }
                Err(_) => {
                    debug!(method, attempt, "call attempt timed out");
                    last = Some(ExternalCallError::Timeout {
                        method: method.to_string(),
                    });
                }
            }

            if attempt < self.policy.max_attempts {
                sleep(delay).await;
                delay = delay.saturating_mul(2).min(self.policy.max_delay);
            }
        }

        Err(last.unwrap_or(ExternalCallError::Exhausted {
            method: method.to_string(),
            attempts: self.policy.max_attempts,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` attempts, then succeeds.
    struct FlakyReader {
        failures: u32,
        attempts: AtomicU32,
    }

    impl ChainReader for FlakyReader {
        fn call(
            &self,
            method: &str,
            _params: Value,
        ) -> BoxFuture<'static, Result<Value, ExternalCallError>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let method = method.to_string();
            let fail = attempt <= self.failures;
            async move {
                if fail {
                    Err(ExternalCallError::Failed {
                        method,
                        reason: "connection reset".to_string(),
                    })
                } else {
                    Ok(json!(42))
                }
            }
            .boxed()
        }
    }

    /// Never resolves; exercises the per-attempt timeout.
    struct HungReader;

    impl ChainReader for HungReader {
        fn call(
            &self,
            _method: &str,
            _params: Value,
        ) -> BoxFuture<'static, Result<Value, ExternalCallError>> {
            std::future::pending().boxed()
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            call_timeout: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn succeeds_after_retries() {
        let reader = Arc::new(FlakyReader {
            failures: 2,
            attempts: AtomicU32::new(0),
        });
        let client = ChainClient::new(reader.clone(), fast_policy());

        let value = client.try_call("eth_call", json!({})).await.unwrap();
        assert_eq!(value, json!(42));
        assert_eq!(reader.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_degrades_to_unknown() {
        let reader = Arc::new(FlakyReader {
            failures: u32::MAX,
            attempts: AtomicU32::new(0),
        });
        let client = ChainClient::new(reader, fast_policy());

        assert_eq!(client.call("eth_call", json!({})).await, Value::Null);
    }

    #[tokio::test]
    async fn hung_calls_hit_the_attempt_timeout() {
        let client = ChainClient::new(Arc::new(HungReader), fast_policy());

        let err = client.try_call("eth_call", json!({})).await.unwrap_err();
        assert!(matches!(err, ExternalCallError::Timeout { .. }));
    }
}
