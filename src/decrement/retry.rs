//! Bounded retry of version conflicts.
//!
//! Only [`StockError::VersionConflict`] is retried. Every other outcome, success or
//! failure, is returned from the attempt that produced it.

use crate::decrement::{Decrementer, StockError, Strategy};
use crate::model::{StockId, StockLevel};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Delay between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay before every retry.
    Fixed(Duration),
    /// Exponential growth from `base`, capped at `max`, with full jitter.
    Jittered { base: Duration, max: Duration },
}

impl Backoff {
    /// The delay after the `attempt`-th failed attempt (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Jittered { base, max } => {
                let cap = base.saturating_mul(1u32 << attempt.min(20)).min(max);
                rand::thread_rng().gen_range(Duration::ZERO..=cap)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below 1 are raised to 1.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            100,
            Backoff::Jittered {
                base: Duration::from_millis(50),
                max: Duration::from_secs(1),
            },
        )
    }
}

/// Runs `strategy` until it stops reporting version conflicts or the attempts run out.
pub async fn decrement_with_retry<D>(
    strategy: &D,
    id: StockId,
    amount: u64,
    policy: &RetryPolicy,
) -> Result<StockLevel, StockError>
where
    D: Decrementer + ?Sized,
{
    let attempts = policy.max_attempts();

    for attempt in 0..attempts {
        match strategy.decrement(id, amount).await {
            Err(e) if e.is_retryable() => {
                if attempt + 1 == attempts {
                    break;
                }
                let delay = policy.backoff().delay_for(attempt);
                debug!(attempt = attempt + 1, ?delay, error = %e, "Conflict, backing off");
                tokio::time::sleep(delay).await;
            }
            outcome => return outcome,
        }
    }

    warn!(%id, attempts, "Retry exhausted");
    Err(StockError::RetryExhausted { id, attempts })
}

/// A [`Decrementer`] that retries the version conflicts of the one it wraps.
#[derive(Clone)]
pub struct RetryCoordinator<D> {
    inner: D,
    policy: RetryPolicy,
}

impl<D: Decrementer> RetryCoordinator<D> {
    pub fn new(inner: D, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<D: Decrementer> Decrementer for RetryCoordinator<D> {
    fn strategy(&self) -> Strategy {
        self.inner.strategy()
    }

    #[instrument(skip(self), name = "retry")]
    async fn decrement(&self, id: StockId, amount: u64) -> Result<StockLevel, StockError> {
        decrement_with_retry(&self.inner, id, amount, &self.policy).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Version;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted outcomes and counts calls.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<StockLevel, StockError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<StockLevel, StockError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Decrementer for Scripted {
        fn strategy(&self) -> Strategy {
            Strategy::Optimistic
        }

        async fn decrement(&self, _id: StockId, _amount: u64) -> Result<StockLevel, StockError> {
            *self.calls.lock().unwrap() += 1;
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted outcome left")
        }
    }

    fn conflict() -> Result<StockLevel, StockError> {
        Err(StockError::VersionConflict {
            id: StockId(1),
            expected: Version(0),
        })
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Backoff::Fixed(Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let ok = StockLevel {
            quantity: 2,
            version: Version(3),
        };
        let scripted = Scripted::new(vec![conflict(), conflict(), Ok(ok)]);

        let result = decrement_with_retry(&scripted, StockId(1), 1, &fast(5)).await;

        assert_eq!(result, Ok(ok));
        assert_eq!(scripted.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let scripted = Scripted::new(vec![conflict(), conflict(), conflict()]);

        let result = decrement_with_retry(&scripted, StockId(1), 1, &fast(3)).await;

        assert_eq!(
            result,
            Err(StockError::RetryExhausted {
                id: StockId(1),
                attempts: 3
            })
        );
        assert_eq!(scripted.calls(), 3);
    }

    #[tokio::test]
    async fn test_non_conflicts_pass_through_untouched() {
        for error in [
            StockError::NotFound(StockId(1)),
            StockError::InsufficientStock {
                id: StockId(1),
                requested: 8,
                available: 2,
            },
            StockError::StorageFailure("gone".into()),
        ] {
            let scripted = Scripted::new(vec![Err(error.clone())]);
            let result = decrement_with_retry(&scripted, StockId(1), 8, &fast(10)).await;
            assert_eq!(result, Err(error));
            assert_eq!(scripted.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_coordinator_keeps_inner_strategy() {
        let coordinator = RetryCoordinator::new(Scripted::new(vec![conflict()]), fast(1));
        assert_eq!(coordinator.strategy(), Strategy::Optimistic);
        assert_eq!(
            coordinator.decrement(StockId(1), 1).await,
            Err(StockError::RetryExhausted {
                id: StockId(1),
                attempts: 1
            })
        );
    }

    #[test]
    fn test_policy_clamps_attempts() {
        assert_eq!(RetryPolicy::new(0, Backoff::Fixed(Duration::ZERO)).max_attempts(), 1);
    }

    #[test]
    fn test_jittered_delay_is_capped() {
        let backoff = Backoff::Jittered {
            base: Duration::from_millis(50),
            max: Duration::from_millis(200),
        };
        for attempt in 0..40 {
            let delay = backoff.delay_for(attempt);
            assert!(delay <= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(50) * (1 << attempt.min(20)));
        }
        assert_eq!(
            Backoff::Fixed(Duration::from_millis(50)).delay_for(7),
            Duration::from_millis(50)
        );
    }
}
