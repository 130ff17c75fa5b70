//! Bounded exponential backoff for device reads.
//!
//! A read is retried with a doubling delay until it succeeds or the retry
//! budget is spent:
//!
//! ```text
//! sleep before attempt 0 = none
//! sleep before attempt n = base_delay * 2^(n-1)     (n = 1, 2, 3, ...)
//! ```
//!
//! With the default 1 s base attempts 1, 2, 3 are preceded by 1 s, 2 s, 4 s,
//! so a fourth attempt starts no earlier than 7 s in. There is no cap
//! other than the budget. An attempt only starts while `now < start + budget`;
//! the sleep that precedes it is not trimmed, so the final sleep may run past
//! the deadline, after which the loop exits without another attempt.
//!
//! Non-transient failures ([`DeviceError::is_transient`]) end the loop at once.

use std::{future::Future, time::Duration};

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use super::{device::DeviceError, error::TelemetryError};

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_wait: Duration,
}

impl RetryPolicy {
    /// Policy with the default 1 s base delay and the given budget.
    pub fn new(max_wait: Duration) -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_wait,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Sleep that follows failed attempt `attempt` (0-based), which is the
    /// sleep before attempt `attempt + 1`. Saturates instead of overflowing.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `op` until it succeeds, fails non-transiently, or the budget
    /// runs out. `device` only labels log lines and errors.
    pub async fn retry<T, F, Fut>(&self, device: &str, mut op: F) -> Result<T, TelemetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DeviceError>>,
    {
        let deadline = Instant::now() + self.max_wait;
        let mut attempt: u32 = 0;

        while Instant::now() < deadline {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e.into()),
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    info!(
                        device,
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Device not responding, retrying"
                    );
                    sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }

        warn!(
            device,
            attempts = attempt,
            budget_secs = self.max_wait.as_secs_f64(),
            "Device failed to respond within retry budget"
        );
        Err(TelemetryError::DeviceUnresponsive {
            device: device.to_string(),
            budget: self.max_wait,
        })
    }
}
