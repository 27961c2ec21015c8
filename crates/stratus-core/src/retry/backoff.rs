//! Built-in backoff policies: exponential and linear.
//!
//! Both work as basic and as extended policies. As extended policies they
//! remember when each location was last tried, so a retry that switches
//! endpoints only waits for whatever part of the backoff has not already
//! elapsed since that endpoint was last hit. A 404 from the secondary is read
//! as replication lag and sends the operation back to the primary for good.

use rand::Rng;
use std::time::{Duration, SystemTime};

use super::policy::{ExtendedRetryPolicy, RetryContext, RetryDecision, RetryInfo, RetryPolicy};
use crate::error::StorageError;
use crate::location::{LocationMode, StorageLocation};
use crate::retry::is_retryable_status;

/// When each location was last attempted during this operation.
#[derive(Debug, Clone, Copy, Default)]
struct LastAttempts {
    primary: Option<SystemTime>,
    secondary: Option<SystemTime>,
}

impl LastAttempts {
    fn record(&mut self, location: StorageLocation, at: SystemTime) {
        match location {
            StorageLocation::Primary => self.primary = Some(at),
            StorageLocation::Secondary => self.secondary = Some(at),
        }
    }

    /// Shortens `delay` by the time already spent away from `target`.
    fn remaining_delay(&self, target: StorageLocation, delay: Duration) -> Duration {
        let last = match target {
            StorageLocation::Primary => self.primary,
            StorageLocation::Secondary => self.secondary,
        };
        match last {
            Some(at) => {
                let since = SystemTime::now().duration_since(at).unwrap_or_default();
                delay.saturating_sub(since)
            }
            None => delay,
        }
    }
}

/// Status/error based gate shared by both policies.
fn retryable(status: Option<u16>, err: &StorageError) -> bool {
    if !err.is_retryable() {
        return false;
    }
    match status {
        Some(code) if code >= 300 => is_retryable_status(code),
        _ => true,
    }
}

fn evaluate_extended(
    ctx: &RetryContext<'_>,
    max_attempts: u32,
    last: &mut LastAttempts,
    delay: Duration,
) -> Option<RetryInfo> {
    if ctx.retry_count >= max_attempts {
        return None;
    }
    let status = ctx.last_result.http_status_code;
    let secondary_not_found =
        ctx.last_result.target_location == StorageLocation::Secondary && status == Some(404);
    if !secondary_not_found && !retryable(status, ctx.last_error) {
        return None;
    }

    let attempted_at = ctx.last_result.end_time.unwrap_or_else(SystemTime::now);
    last.record(ctx.last_result.target_location, attempted_at);

    let mut info = RetryInfo::from_context(ctx);
    if secondary_not_found && ctx.location_mode != LocationMode::SecondaryOnly {
        info.updated_location_mode = LocationMode::PrimaryOnly;
        info.target_location = StorageLocation::Primary;
    }
    info.retry_interval = last.remaining_delay(info.target_location, delay);
    Some(info)
}

/// Jittered exponential backoff: `min_backoff + (2^n - 1) * delta * [0.8, 1.2]`,
/// capped at `max_backoff`.
#[derive(Debug, Clone)]
pub struct ExponentialRetry {
    /// Base increment for backoff.
    pub delta_backoff: Duration,
    /// Maximum number of retries (not counting the first attempt).
    pub max_attempts: u32,
    /// Delay added to every retry.
    pub min_backoff: Duration,
    /// Upper bound on backoff delay.
    pub max_backoff: Duration,
    last_attempts: LastAttempts,
}

impl Default for ExponentialRetry {
    fn default() -> Self {
        Self {
            delta_backoff: Duration::from_secs(4),
            max_attempts: 3,
            min_backoff: Duration::from_secs(3),
            max_backoff: Duration::from_secs(120),
            last_attempts: LastAttempts::default(),
        }
    }
}

impl ExponentialRetry {
    pub fn new(delta_backoff: Duration, max_attempts: u32) -> Self {
        Self {
            delta_backoff,
            max_attempts,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry_count + 1`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let delta_ms = self.delta_backoff.as_millis().min(u64::MAX as u128) as u64;
        let (lo, hi) = (delta_ms / 10 * 8, delta_ms / 10 * 12);
        let jittered = if hi > lo {
            rand::thread_rng().gen_range(lo..=hi)
        } else {
            delta_ms
        };
        let factor = (1u64 << retry_count.min(30)) - 1;
        let increment = Duration::from_millis(jittered.saturating_mul(factor));
        self.min_backoff
            .saturating_add(increment)
            .min(self.max_backoff)
    }
}

impl RetryPolicy for ExponentialRetry {
    fn should_retry(
        &mut self,
        retry_count: u32,
        status_code: Option<u16>,
        last_error: &StorageError,
    ) -> RetryDecision {
        if retry_count >= self.max_attempts || !retryable(status_code, last_error) {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff(retry_count))
    }

    fn fresh(&self) -> Box<dyn RetryPolicy> {
        Box::new(Self {
            last_attempts: LastAttempts::default(),
            ..self.clone()
        })
    }
}

impl ExtendedRetryPolicy for ExponentialRetry {
    fn evaluate(&mut self, ctx: &RetryContext<'_>) -> Option<RetryInfo> {
        let delay = self.backoff(ctx.retry_count);
        let max = self.max_attempts;
        evaluate_extended(ctx, max, &mut self.last_attempts, delay)
    }

    fn fresh(&self) -> Box<dyn ExtendedRetryPolicy> {
        Box::new(Self {
            last_attempts: LastAttempts::default(),
            ..self.clone()
        })
    }
}

/// Fixed delay between retries.
#[derive(Debug, Clone)]
pub struct LinearRetry {
    pub delta_backoff: Duration,
    /// Maximum number of retries (not counting the first attempt).
    pub max_attempts: u32,
    last_attempts: LastAttempts,
}

impl Default for LinearRetry {
    fn default() -> Self {
        Self {
            delta_backoff: Duration::from_secs(30),
            max_attempts: 3,
            last_attempts: LastAttempts::default(),
        }
    }
}

impl LinearRetry {
    pub fn new(delta_backoff: Duration, max_attempts: u32) -> Self {
        Self {
            delta_backoff,
            max_attempts,
            last_attempts: LastAttempts::default(),
        }
    }
}

impl RetryPolicy for LinearRetry {
    fn should_retry(
        &mut self,
        retry_count: u32,
        status_code: Option<u16>,
        last_error: &StorageError,
    ) -> RetryDecision {
        if retry_count >= self.max_attempts || !retryable(status_code, last_error) {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.delta_backoff)
    }

    fn fresh(&self) -> Box<dyn RetryPolicy> {
        Box::new(LinearRetry::new(self.delta_backoff, self.max_attempts))
    }
}

impl ExtendedRetryPolicy for LinearRetry {
    fn evaluate(&mut self, ctx: &RetryContext<'_>) -> Option<RetryInfo> {
        let delay = self.delta_backoff;
        let max = self.max_attempts;
        evaluate_extended(ctx, max, &mut self.last_attempts, delay)
    }

    fn fresh(&self) -> Box<dyn ExtendedRetryPolicy> {
        Box::new(LinearRetry::new(self.delta_backoff, self.max_attempts))
    }
}
