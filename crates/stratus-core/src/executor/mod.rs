//! Execution engine: runs a `StorageCommand` through the attempt loop until it
//! succeeds, fails terminally or runs out of time.
//!
//! ```text
//! Init -> BuildRequest -> Send -> HeadersReceived -> PreProcess
//!      -> StreamBody -> PostProcess -> Success
//!                 any failure -> RetryDecision -> Delay -> Init | Failed
//! ```
//!
//! The loop is shared by the blocking and the async entry points; only the
//! way it waits differs (see `driver`).

mod attempt;
mod body;
mod decide;
mod driver;
mod state;


use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use crate::command::StorageCommand;
use crate::context::{OperationContext, RetryEvent};
use crate::error::StorageError;
use crate::location::resolve_location_mode;
use crate::options::RequestOptions;
use crate::result::RequestResult;
use crate::transport::{CurlTransport, Transport};

use self::decide::{decide, Next};
use self::driver::{Blocking, Driver, NonBlocking};
use self::state::{ExecutionState, Phase};

/// Runs storage commands over a shared transport. Cheap to clone; one
/// executor can serve any number of concurrent operations.
#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Blocks the calling thread for the whole operation, including retry delays.
    pub fn execute_sync<T: Send + 'static>(
        &self,
        cmd: &mut StorageCommand<T>,
        options: &RequestOptions,
        ctx: &OperationContext,
    ) -> Result<T, StorageError> {
        let span = operation_span(ctx);
        futures::executor::block_on(
            run(&Blocking, &self.transport, cmd, options, ctx).instrument(span),
        )
    }

    /// Never blocks a runtime worker: network and body I/O run on tokio's
    /// blocking pool and retry delays are timers. Must be polled inside a
    /// tokio runtime.
    pub async fn execute_async<T: Send + 'static>(
        &self,
        cmd: &mut StorageCommand<T>,
        options: &RequestOptions,
        ctx: &OperationContext,
    ) -> Result<T, StorageError> {
        let span = operation_span(ctx);
        run(&NonBlocking, &self.transport, cmd, options, ctx)
            .instrument(span)
            .await
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(Arc::new(CurlTransport::default()))
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").finish_non_exhaustive()
    }
}

fn operation_span(ctx: &OperationContext) -> tracing::Span {
    tracing::debug_span!("storage_operation", client_request_id = ctx.client_request_id())
}

async fn run<D, T>(
    driver: &D,
    transport: &Arc<dyn Transport>,
    cmd: &mut StorageCommand<T>,
    options: &RequestOptions,
    ctx: &OperationContext,
) -> Result<T, StorageError>
where
    D: Driver,
    T: Send + 'static,
{
    let requested = cmd
        .location_mode
        .or(options.location_mode)
        .unwrap_or_default();
    let mode = resolve_location_mode(&cmd.uri, requested, cmd.command_location_mode)?;
    // A caller-set expiry wins; otherwise each run gets a fresh deadline.
    let expiry = cmd.operation_expiry.or_else(|| {
        options
            .maximum_execution_time
            .and_then(|budget| Instant::now().checked_add(budget))
    });
    let mut state = ExecutionState::new(mode, options.retry_strategy(), ctx.cancel_handle(), expiry);

    loop {
        state.phase = Phase::Init;
        cmd.results.push(RequestResult::started(state.current_location));
        // Covers the attempt and the delay that follows it.
        let _registration = options
            .operation_control
            .as_ref()
            .map(|control| control.register(ctx.client_request_id(), &state.cancel));

        let outcome = attempt::run_attempt(driver, transport, &mut state, cmd, options, ctx).await;

        let err = match outcome {
            Ok(value) => {
                if let Some(result) = cmd.current_result_mut() {
                    result.finish();
                }
                if let Some(dispose) = cmd.dispose_action.take() {
                    dispose();
                }
                state.phase = Phase::Success;
                state.last_error = None;
                tracing::debug!(attempts = cmd.results.len(), "operation succeeded");
                return Ok(value);
            }
            Err(err) => state.promote_expiry(err),
        };

        let failed_phase = state.phase;
        if let Some(result) = cmd.current_result_mut() {
            result.record_error(&err);
            result.finish();
        }
        tracing::debug!(
            phase = %failed_phase,
            attempt = state.retry_count,
            location = %state.current_location,
            retryable = err.is_retryable(),
            error = %err,
            "attempt failed"
        );
        state.last_error = Some(err.clone());

        let info = match decide(&mut state, cmd, err) {
            Next::Retry(info) => info,
            Next::Fail(err) => {
                state.phase = Phase::Failed;
                tracing::warn!(
                    attempts = cmd.results.len(),
                    error = %err,
                    "operation failed"
                );
                return Err(err);
            }
        };

        let last_error = state
            .last_error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        tracing::info!(
            retry = state.retry_count + 1,
            delay_ms = info.retry_interval.as_millis() as u64,
            target = %info.target_location,
            mode = ?info.updated_location_mode,
            error = %last_error,
            "retrying"
        );
        ctx.retrying(&RetryEvent {
            client_request_id: ctx.client_request_id(),
            retry_count: state.retry_count + 1,
            delay: info.retry_interval,
            target_location: info.target_location,
            location_mode: info.updated_location_mode,
            last_error: &last_error,
        });

        if let Some(recover) = cmd.recovery_action.as_mut() {
            if let Some(pending) = state.last_error.as_ref() {
                if let Err(e) = recover(&mut cmd.body_target, pending, ctx) {
                    state.phase = Phase::Failed;
                    let e = e.with_retryable(false);
                    tracing::warn!(error = %e, "recovery action failed");
                    return Err(e);
                }
            }
        }

        state.phase = Phase::Delay;
        if driver.delay(info.retry_interval, &state.cancel).await {
            state.phase = Phase::Failed;
            let err = state.promote_expiry(StorageError::cancelled());
            tracing::warn!(error = %err, "operation cancelled during retry delay");
            return Err(err);
        }
        state.advance(&info);
    }
}
