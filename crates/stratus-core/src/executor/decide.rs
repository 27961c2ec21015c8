//! Retry decision after a failed attempt.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::command::StorageCommand;
use crate::error::StorageError;
use crate::location::{next_location, CommandLocationMode, StorageLocation};
use crate::result::RequestResult;
use crate::retry::{clamp_delay, RetryContext, RetryInfo};

use super::state::{ExecutionState, Phase};

#[derive(Debug)]
pub(crate) enum Next {
    Retry(RetryInfo),
    Fail(StorageError),
}

/// Non-retryable errors fail without consulting the policy. Otherwise the
/// policy decides, its delay is clamped, and the retry is refused if it would
/// overrun the operation expiry or target a location the operation cannot use.
pub(crate) fn decide<T: 'static>(
    state: &mut ExecutionState,
    cmd: &StorageCommand<T>,
    err: StorageError,
) -> Next {
    state.phase = Phase::RetryDecision;
    if !err.is_retryable() {
        return Next::Fail(err);
    }

    let fallback;
    let last_result = match cmd.current_result() {
        Some(r) => r,
        None => {
            fallback = RequestResult::started(state.current_location);
            &fallback
        }
    };
    let ctx = RetryContext {
        retry_count: state.retry_count,
        last_result,
        last_error: &err,
        current_location: state.current_location,
        next_location: next_location(state.current_location, state.location_mode),
        location_mode: state.location_mode,
    };
    let strategy = &mut state.strategy;
    let info = match catch_unwind(AssertUnwindSafe(|| strategy.evaluate(&ctx))) {
        Ok(Some(info)) => info,
        Ok(None) => return Next::Fail(err),
        Err(panic) => {
            return Next::Fail(
                StorageError::policy(format!(
                    "retry policy failed: {}",
                    panic_message(panic.as_ref())
                ))
                .with_source(err),
            )
        }
    };

    let info = RetryInfo {
        retry_interval: clamp_delay(info.retry_interval),
        ..info
    };
    if state.delay_exceeds_budget(info.retry_interval) {
        tracing::debug!(
            delay_ms = info.retry_interval.as_millis() as u64,
            "retry delay would exceed the operation expiry"
        );
        return Next::Fail(err);
    }
    if let Err(reason) = check_target(cmd, &info) {
        return Next::Fail(StorageError::policy(reason).with_source(err));
    }
    Next::Retry(info)
}

fn check_target<T: 'static>(cmd: &StorageCommand<T>, info: &RetryInfo) -> Result<(), String> {
    let target = info.target_location;
    if !info.updated_location_mode.allows(target) {
        return Err(format!(
            "retry policy targets the {} location under mode {:?}",
            target, info.updated_location_mode
        ));
    }
    let allowed_by_command = match cmd.command_location_mode {
        CommandLocationMode::PrimaryOnly => target == StorageLocation::Primary,
        CommandLocationMode::SecondaryOnly => target == StorageLocation::Secondary,
        CommandLocationMode::PrimaryOrSecondary => true,
    };
    if !allowed_by_command {
        return Err(format!(
            "retry policy targets the {} location, which this operation cannot use",
            target
        ));
    }
    if cmd.uri.get(target).is_none() {
        return Err(format!(
            "retry policy targets the {} location, which has no endpoint",
            target
        ));
    }
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("panic")
}
