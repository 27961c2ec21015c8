use std::fmt;
use std::time::Duration;

use crate::error::StorageError;
use crate::location::{LocationMode, StorageLocation};
use crate::result::RequestResult;

/// Upper bound on any retry delay, whatever the policy returns.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Clamp a policy-provided delay into `[0, MAX_RETRY_BACKOFF]`.
pub fn clamp_delay(delay: Duration) -> Duration {
    delay.min(MAX_RETRY_BACKOFF)
}

/// Decision returned by a basic retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Everything an endpoint-aware policy may look at after a failed attempt.
#[derive(Debug)]
pub struct RetryContext<'a> {
    /// Retries performed so far (0 after the first attempt failed).
    pub retry_count: u32,
    /// Record of the attempt that just failed.
    pub last_result: &'a RequestResult,
    pub last_error: &'a StorageError,
    /// Location the failed attempt targeted.
    pub current_location: StorageLocation,
    /// Location the failover resolver would pick next.
    pub next_location: StorageLocation,
    pub location_mode: LocationMode,
}

/// Extended retry decision: where and when to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryInfo {
    pub target_location: StorageLocation,
    pub updated_location_mode: LocationMode,
    pub retry_interval: Duration,
}

impl RetryInfo {
    /// Retry at the resolver's next location under the unchanged mode.
    pub fn from_context(ctx: &RetryContext<'_>) -> Self {
        Self {
            target_location: ctx.next_location,
            updated_location_mode: ctx.location_mode,
            retry_interval: Duration::ZERO,
        }
    }
}

/// Basic retry policy: looks at the retry count, status code and error only.
///
/// Policies may keep per-operation state; the engine calls `fresh` once per
/// invocation so concurrent operations never share counters.
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    fn should_retry(
        &mut self,
        retry_count: u32,
        status_code: Option<u16>,
        last_error: &StorageError,
    ) -> RetryDecision;

    fn fresh(&self) -> Box<dyn RetryPolicy>;
}

/// Endpoint-aware retry policy. Returning `None` stops retrying.
pub trait ExtendedRetryPolicy: Send + Sync + fmt::Debug {
    fn evaluate(&mut self, ctx: &RetryContext<'_>) -> Option<RetryInfo>;

    fn fresh(&self) -> Box<dyn ExtendedRetryPolicy>;
}

/// A retry policy resolved once at the start of the attempt loop.
#[derive(Debug)]
pub enum RetryStrategy {
    Basic(Box<dyn RetryPolicy>),
    Extended(Box<dyn ExtendedRetryPolicy>),
}

impl RetryStrategy {
    pub fn basic(policy: impl RetryPolicy + 'static) -> Self {
        RetryStrategy::Basic(Box::new(policy))
    }

    pub fn extended(policy: impl ExtendedRetryPolicy + 'static) -> Self {
        RetryStrategy::Extended(Box::new(policy))
    }

    pub fn none() -> Self {
        RetryStrategy::Basic(Box::new(NoRetry))
    }

    /// New instance with no per-operation state carried over.
    pub fn fresh(&self) -> Self {
        match self {
            RetryStrategy::Basic(p) => RetryStrategy::Basic(p.fresh()),
            RetryStrategy::Extended(p) => RetryStrategy::Extended(p.fresh()),
        }
    }

    /// Runs the policy. Basic policies keep the mode and retry wherever the
    /// failover resolver points next.
    pub fn evaluate(&mut self, ctx: &RetryContext<'_>) -> Option<RetryInfo> {
        match self {
            RetryStrategy::Basic(policy) => {
                match policy.should_retry(
                    ctx.retry_count,
                    ctx.last_result.http_status_code,
                    ctx.last_error,
                ) {
                    RetryDecision::NoRetry => None,
                    RetryDecision::RetryAfter(delay) => Some(RetryInfo {
                        retry_interval: delay,
                        ..RetryInfo::from_context(ctx)
                    }),
                }
            }
            RetryStrategy::Extended(policy) => policy.evaluate(ctx),
        }
    }
}

impl Clone for RetryStrategy {
    fn clone(&self) -> Self {
        self.fresh()
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::Extended(Box::new(super::ExponentialRetry::default()))
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_retry(&mut self, _: u32, _: Option<u16>, _: &StorageError) -> RetryDecision {
        RetryDecision::NoRetry
    }

    fn fresh(&self) -> Box<dyn RetryPolicy> {
        Box::new(NoRetry)
    }
}
