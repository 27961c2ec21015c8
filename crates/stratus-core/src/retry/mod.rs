//! Retry and backoff policy.
//!
//! This module holds status/transport classification, the basic and
//! endpoint-aware policy traits the engine consults after a failed attempt,
//! and the built-in exponential and linear policies.

mod backoff;
mod classify;
mod policy;

pub use backoff::{ExponentialRetry, LinearRetry};
pub use classify::{
    classify_curl_error, classify_http_status, classify_transport, is_retryable_status,
    FailureClass,
};
pub use policy::{
    clamp_delay, ExtendedRetryPolicy, NoRetry, RetryContext, RetryDecision, RetryInfo,
    RetryPolicy, RetryStrategy, MAX_RETRY_BACKOFF,
};
