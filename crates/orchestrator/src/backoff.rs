use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Bounded exponential backoff: the delay after attempt `n` (0-based) is
/// `min(initial_delay * 2^n, max_delay)`. No delay follows the last attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub const fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
        }
    }

    /// Site liveness checks: 7 attempts, 1 s initial delay, 30 s cap.
    pub const fn liveness() -> Self {
        Self::new(7, Duration::from_secs(1), Duration::from_secs(30))
    }

    /// Evaluator notification: 6 attempts, 1 s initial delay, 60 s cap.
    pub const fn notification() -> Self {
        Self::new(6, Duration::from_secs(1), Duration::from_secs(60))
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `attempt` until it returns true or the budget is spent.
    pub async fn retry<F, Fut>(&self, mut attempt: F) -> RetryOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = bool>,
    {
        for n in 0..self.max_attempts {
            if attempt(n).await {
                return RetryOutcome::Succeeded { attempts: n + 1 };
            }

            if n + 1 < self.max_attempts {
                let delay = self.delay(n);
                debug!(attempt = n + 1, delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::time::sleep(delay).await;
            }
        }

        RetryOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
}
