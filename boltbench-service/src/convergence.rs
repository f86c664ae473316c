//! Polling an endpoint until an object becomes readable.
//!
//! After an object is written to or repaired in the primary store, the accelerator may take some
//! time until it serves the object. [`poll_until_available`] measures that time by reading the
//! object repeatedly until a read succeeds. How long it keeps trying is governed by a
//! [`RetryPolicy`]:
//!
//! - [`RetryPolicy::default`] gives up after a deadline and backs off exponentially between
//!   attempts.
//! - [`RetryPolicy::legacy`] retries forever without pausing. Only use it in controlled test
//!   environments, ideally together with a [`CancellationToken`].

use std::fmt;
use std::time::Duration;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, ReadRange};
use crate::error::EngineError;

/// Selects between the bounded default and the unbounded legacy behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    /// Retries until a deadline or attempt limit, with exponential backoff.
    #[default]
    Bounded,
    /// Retries forever, immediately after each failure.
    Legacy,
}

impl fmt::Display for RetryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryMode::Bounded => f.write_str("bounded"),
            RetryMode::Legacy => f.write_str("legacy"),
        }
    }
}

/// Governs how often and how long [`poll_until_available`] retries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Reported with results and logged when polling starts.
    pub mode: RetryMode,
    /// Gives up after this many failed attempts.
    pub max_attempts: Option<u32>,
    /// Gives up once this much time has passed since the first attempt.
    pub deadline: Option<Duration>,
    /// Pause after the first failed attempt. Doubles after every further failure.
    pub initial_backoff: Duration,
    /// Upper bound for the pause between attempts.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Retries forever without pausing between attempts.
    pub fn legacy() -> Self {
        Self {
            mode: RetryMode::Legacy,
            max_attempts: None,
            deadline: None,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// The pause after `failures` consecutive failed attempts.
    fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    fn is_exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
            || self.deadline.is_some_and(|deadline| elapsed >= deadline)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            mode: RetryMode::Bounded,
            max_attempts: None,
            deadline: Some(Duration::from_secs(300)),
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// A successful [`poll_until_available`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvergenceResult {
    /// Time from the first attempt until the successful read completed.
    pub elapsed: Duration,
    /// Number of attempts, including the successful one.
    pub attempts: u32,
    /// The mode of the policy that was used.
    pub mode: RetryMode,
}

impl Serialize for ConvergenceResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        let elapsed = format!("{:.2} secs", self.elapsed.as_secs_f64());
        map.serialize_entry("auto_heal_time", &elapsed)?;
        map.serialize_entry("retry_mode", &self.mode)?;
        map.end()
    }
}

/// Reasons why [`poll_until_available`] stopped without a successful read.
#[derive(Debug, Error)]
pub enum ConvergenceError {
    /// The retry policy ran out of attempts or time.
    #[error("object still unavailable after {attempts} attempts in {elapsed:.2?}")]
    Exhausted {
        /// Number of failed attempts.
        attempts: u32,
        /// Time spent polling.
        elapsed: Duration,
        /// The error of the last attempt.
        #[source]
        last_error: EngineError,
    },

    /// Polling was cancelled through its [`CancellationToken`].
    #[error("polling cancelled after {attempts} attempts in {elapsed:.2?}")]
    Cancelled {
        /// Number of completed attempts.
        attempts: u32,
        /// Time spent polling.
        elapsed: Duration,
    },
}

/// Reads an object from `backend` until the read succeeds, the policy is exhausted, or `cancel`
/// fires.
///
/// Every error of an attempt, including not-found, counts as "not available yet".
pub async fn poll_until_available(
    backend: &dyn Backend,
    container: &str,
    key: &str,
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
) -> Result<ConvergenceResult, ConvergenceError> {
    match policy.mode {
        RetryMode::Bounded => tracing::info!(
            backend = backend.name(),
            container,
            key,
            deadline = ?policy.deadline,
            max_attempts = ?policy.max_attempts,
            "polling until object is available"
        ),
        RetryMode::Legacy => tracing::warn!(
            backend = backend.name(),
            container,
            key,
            "polling until object is available, retrying forever (legacy mode)"
        ),
    }

    let start = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancelled(cancel) => None,
            result = attempt(backend, container, key, policy, start) => Some(result),
        };
        let Some(result) = result else {
            return Err(ConvergenceError::Cancelled {
                attempts,
                elapsed: start.elapsed(),
            });
        };

        attempts = attempts.saturating_add(1);
        let elapsed = start.elapsed();
        let last_error = match result {
            Ok(()) => {
                tracing::info!(attempts, ?elapsed, "object is available");
                return Ok(ConvergenceResult {
                    elapsed,
                    attempts,
                    mode: policy.mode,
                });
            }
            Err(error) => error,
        };

        tracing::debug!(
            attempts,
            error = &last_error as &dyn std::error::Error,
            "object not available yet"
        );

        if policy.is_exhausted(attempts, elapsed) {
            return Err(ConvergenceError::Exhausted {
                attempts,
                elapsed,
                last_error,
            });
        }

        let mut backoff = policy.backoff(attempts);
        if let Some(deadline) = policy.deadline {
            backoff = backoff.min(deadline.saturating_sub(elapsed));
        }

        if backoff.is_zero() {
            // Without a pause the loop never yields on its own.
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                biased;
                _ = cancelled(cancel) => {
                    return Err(ConvergenceError::Cancelled {
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
                _ = tokio::time::sleep(backoff) => (),
            }
        }
    }
}

/// One read, cut short once the policy's deadline passes.
async fn attempt(
    backend: &dyn Backend,
    container: &str,
    key: &str,
    policy: &RetryPolicy,
    start: Instant,
) -> Result<(), EngineError> {
    let Some(deadline) = policy.deadline else {
        return read_fully(backend, container, key).await;
    };

    let remaining = deadline.saturating_sub(start.elapsed());
    tokio::time::timeout(remaining, read_fully(backend, container, key))
        .await
        .unwrap_or_else(|_| Err(EngineError::Timeout(remaining)))
}

async fn read_fully(backend: &dyn Backend, container: &str, key: &str) -> Result<(), EngineError> {
    backend.get_object_metadata(container, key).await?;
    backend.get_object(container, key, ReadRange::Full).await?;
    Ok(())
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::testutil::{FlakyBackend, HangingBackend};

    const BUCKET: &str = "bucket";

    fn flaky(failures: usize) -> FlakyBackend {
        let inner = InMemoryBackend::new("memory");
        inner.insert_object(BUCKET, "object", "contents", None);
        FlakyBackend::new(inner, failures)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let backend = flaky(2);

        let result = poll_until_available(&backend, BUCKET, "object", &RetryPolicy::default(), None)
            .await
            .unwrap();

        assert_eq!(result.attempts, 3);
        assert_eq!(backend.attempts(), 3);
        assert_eq!(result.mode, RetryMode::Bounded);
        // Backoff of 50ms and 100ms after the two failures.
        assert!(result.elapsed >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn legacy_retries_immediately() {
        let backend = flaky(5);

        let result = poll_until_available(&backend, BUCKET, "object", &RetryPolicy::legacy(), None)
            .await
            .unwrap();

        assert_eq!(result.attempts, 6);
        assert_eq!(result.mode, RetryMode::Legacy);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let backend = InMemoryBackend::with_containers("memory", [BUCKET]);
        let policy = RetryPolicy {
            max_attempts: Some(3),
            ..RetryPolicy::default()
        };

        let err = poll_until_available(&backend, BUCKET, "missing", &policy, None)
            .await
            .unwrap_err();

        let ConvergenceError::Exhausted {
            attempts,
            last_error,
            ..
        } = err
        else {
            panic!("expected exhaustion");
        };
        assert_eq!(attempts, 3);
        assert!(matches!(last_error, EngineError::Backend(ref e) if e.is_not_found()));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_deadline() {
        let backend = InMemoryBackend::with_containers("memory", [BUCKET]);
        let policy = RetryPolicy {
            deadline: Some(Duration::from_secs(1)),
            initial_backoff: Duration::from_millis(100),
            ..RetryPolicy::default()
        };

        let err = poll_until_available(&backend, BUCKET, "missing", &policy, None)
            .await
            .unwrap_err();

        let ConvergenceError::Exhausted { elapsed, .. } = err else {
            panic!("expected exhaustion");
        };
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_off_hanging_read() {
        let policy = RetryPolicy {
            deadline: Some(Duration::from_secs(1)),
            ..RetryPolicy::default()
        };

        let poll = poll_until_available(&HangingBackend, BUCKET, "object", &policy, None);
        let err = tokio::time::timeout(Duration::from_secs(3600), poll)
            .await
            .expect("polling must stop at the deadline")
            .unwrap_err();

        let ConvergenceError::Exhausted {
            attempts,
            elapsed,
            last_error,
        } = err
        else {
            panic!("expected exhaustion");
        };
        assert_eq!(attempts, 1);
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2));
        assert!(matches!(last_error, EngineError::Timeout(_)));
    }

    #[tokio::test]
    async fn cancellation_stops_legacy_loop() {
        let backend = InMemoryBackend::with_containers("memory", [BUCKET]);
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel();
            })
        };

        let err = poll_until_available(
            &backend,
            BUCKET,
            "missing",
            &RetryPolicy::legacy(),
            Some(&token),
        )
        .await
        .unwrap_err();

        canceller.await.unwrap();
        assert!(matches!(err, ConvergenceError::Cancelled { .. }));
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff(1), Duration::from_millis(50));
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(200));
        assert_eq!(policy.backoff(20), Duration::from_secs(5));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(5));
        assert_eq!(RetryPolicy::legacy().backoff(7), Duration::ZERO);
    }

    #[test]
    fn result_reports_seconds_and_mode() {
        let result = ConvergenceResult {
            elapsed: Duration::from_millis(1234),
            attempts: 4,
            mode: RetryMode::Legacy,
        };

        assert_eq!(
            serde_json::to_value(result).unwrap(),
            json!({ "auto_heal_time": "1.23 secs", "retry_mode": "legacy" })
        );
    }
}
