//! Mutable state of one invocation of the attempt loop.

use std::fmt;
use std::time::{Duration, Instant};

use crate::cancel::CancelHandle;
use crate::error::{ErrorKind, StorageError};
use crate::location::{LocationMode, StorageLocation};
use crate::retry::{RetryInfo, RetryStrategy};

/// Shortest per-attempt budget handed to the transport; a zero timeout would
/// mean "unbounded" to some transports.
const MIN_ATTEMPT_BUDGET: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Init,
    BuildRequest,
    Send,
    HeadersReceived,
    PreProcess,
    StreamBody,
    PostProcess,
    RetryDecision,
    Delay,
    Success,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::BuildRequest => "build-request",
            Phase::Send => "send",
            Phase::HeadersReceived => "headers-received",
            Phase::PreProcess => "pre-process",
            Phase::StreamBody => "stream-body",
            Phase::PostProcess => "post-process",
            Phase::RetryDecision => "retry-decision",
            Phase::Delay => "delay",
            Phase::Success => "success",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub(crate) struct ExecutionState {
    pub(crate) retry_count: u32,
    pub(crate) current_location: StorageLocation,
    pub(crate) location_mode: LocationMode,
    pub(crate) operation_expiry: Option<Instant>,
    pub(crate) strategy: RetryStrategy,
    pub(crate) cancel: CancelHandle,
    pub(crate) phase: Phase,
    pub(crate) last_error: Option<StorageError>,
}

impl ExecutionState {
    pub(crate) fn new(
        location_mode: LocationMode,
        strategy: RetryStrategy,
        cancel: CancelHandle,
        operation_expiry: Option<Instant>,
    ) -> Self {
        Self {
            retry_count: 0,
            current_location: location_mode.initial_location(),
            location_mode,
            operation_expiry,
            strategy,
            cancel,
            phase: Phase::Init,
            last_error: None,
        }
    }

    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.operation_expiry
            .map(|e| e.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.operation_expiry
            .map(|e| Instant::now() >= e)
            .unwrap_or(false)
    }

    /// Client-side limit for the next network exchange.
    pub(crate) fn attempt_timeout(&self) -> Option<Duration> {
        self.remaining().map(|r| r.max(MIN_ATTEMPT_BUDGET))
    }

    /// Server timeout to send, never longer than what is left of the budget.
    pub(crate) fn server_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        match (requested, self.attempt_timeout()) {
            (Some(r), Some(left)) => Some(r.min(left)),
            (r, None) => r,
            (None, left) => left,
        }
    }

    /// True if waiting `delay` would run past the operation expiry.
    pub(crate) fn delay_exceeds_budget(&self, delay: Duration) -> bool {
        match self.operation_expiry {
            Some(expiry) => Instant::now()
                .checked_add(delay)
                .map(|t| t > expiry)
                .unwrap_or(true),
            None => false,
        }
    }

    /// Errors caused by the operation's own expiry surface as timeouts.
    pub(crate) fn promote_expiry(&self, err: StorageError) -> StorageError {
        if self.is_expired() && err.is_cancellation() && err.kind() != ErrorKind::Timeout {
            StorageError::timeout("the operation did not complete within the maximum execution time")
                .with_source(err)
        } else {
            err
        }
    }

    pub(crate) fn advance(&mut self, info: &RetryInfo) {
        self.retry_count += 1;
        self.current_location = info.target_location;
        self.location_mode = info.updated_location_mode;
        self.phase = Phase::Init;
    }
}
