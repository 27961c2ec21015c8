//! One attempt: build, send, interpret the head, stream the body, post-process.

use std::sync::Arc;

use crate::command::StorageCommand;
use crate::context::{OperationContext, RequestEvent};
use crate::error::{translate_transport, StorageError};
use crate::location::{LocationMode, StorageLocation};
use crate::options::RequestOptions;
use crate::request::{Method, StorageRequest};
use crate::response::{headers, ResponseHead, StorageResponse};
use crate::transport::{SendControl, Transport};

use super::body::{copy_body, drain_error_body, BodyChecks};
use super::driver::Driver;
use super::state::{ExecutionState, Phase};

pub(crate) async fn run_attempt<D, T>(
    driver: &D,
    transport: &Arc<dyn Transport>,
    state: &mut ExecutionState,
    cmd: &mut StorageCommand<T>,
    options: &RequestOptions,
    ctx: &OperationContext,
) -> Result<T, StorageError>
where
    D: Driver,
    T: Send + 'static,
{
    state.phase = Phase::BuildRequest;
    let request = build_request(state, cmd, options, ctx)?;
    let method = request.method;
    let url = request.url.clone();
    let sent_id = request
        .header(headers::CLIENT_REQUEST_ID)
        .map(str::to_string);
    ctx.sending_request(&RequestEvent {
        client_request_id: ctx.client_request_id(),
        attempt: state.retry_count,
        location: state.current_location,
        method,
        url: &url,
        status: None,
    });

    state.phase = Phase::Send;
    tracing::debug!(
        client_request_id = ctx.client_request_id(),
        attempt = state.retry_count,
        location = %state.current_location,
        %method,
        url = %url,
        "sending request"
    );
    let control = SendControl {
        cancel: state.cancel.clone(),
        timeout: state.attempt_timeout(),
    };
    let t = Arc::clone(transport);
    let sent = driver.run_blocking(move || t.send(request, &control)).await?;
    let StorageResponse { head, body } =
        sent.map_err(|e| translate_transport(e, state.is_expired()))?;

    state.phase = Phase::HeadersReceived;
    if let Some(result) = cmd.current_result_mut() {
        result.record_head(&head);
    }
    ctx.response_received(&RequestEvent {
        client_request_id: ctx.client_request_id(),
        attempt: state.retry_count,
        location: state.current_location,
        method,
        url: &url,
        status: Some(head.status),
    });
    tracing::debug!(
        client_request_id = ctx.client_request_id(),
        status = head.status,
        request_id = head.headers.get(headers::REQUEST_ID).unwrap_or("-"),
        "response received"
    );
    check_client_request_id(sent_id.as_deref(), &head)?;
    let pending = status_error(&head, state.current_location, state.location_mode);

    state.phase = Phase::PreProcess;
    let partial = (cmd.pre_process)(&head, pending.as_ref(), ctx);

    state.phase = Phase::StreamBody;
    let partial = match partial {
        Ok(partial) => partial,
        Err(err) => {
            let drained = driver.run_blocking(move || drain_error_body(body)).await?;
            if let Some(result) = cmd.current_result_mut() {
                result.bytes_received = drained.len() as u64;
            }
            let err = match (cmd.parse_error)(&mut drained.as_slice()) {
                Some(info) => err.with_extended_info(info),
                None => err,
            };
            return Err(err);
        }
    };

    let checks = body_checks(&head, method, cmd, options);
    let mut target = std::mem::take(&mut cmd.body_target);
    let cancel = state.cancel.clone();
    let (target, copied) = driver
        .run_blocking(move || {
            let r = copy_body(body, &mut target, &checks, &cancel);
            (target, r)
        })
        .await?;
    cmd.body_target = target;
    let content = copied?;
    if let Some(result) = cmd.current_result_mut() {
        result.bytes_received = content.length;
    }

    state.phase = Phase::PostProcess;
    let value = match cmd.post_process.as_mut() {
        Some(post) => post(partial, &head, content, ctx)?,
        None => partial.ok_or_else(|| {
            StorageError::parse(format!(
                "{} response produced no result",
                head.status
            ))
        })?,
    };
    Ok(value)
}

fn build_request<T: 'static>(
    state: &ExecutionState,
    cmd: &mut StorageCommand<T>,
    options: &RequestOptions,
    ctx: &OperationContext,
) -> Result<StorageRequest, StorageError> {
    let base = cmd.uri.get(state.current_location).ok_or_else(|| {
        StorageError::pre_flight(format!(
            "no {} endpoint configured",
            state.current_location
        ))
    })?;
    let url = cmd.credentials.transform_uri(base);
    let body = match cmd.build_content.as_mut() {
        Some(build) => build(ctx).map_err(terminal)?,
        None => None,
    };
    let server_timeout = state.server_timeout(cmd.server_timeout.or(options.server_timeout));
    let mut request = (cmd.build_request)(&url, server_timeout, body, ctx).map_err(terminal)?;
    for (name, value) in ctx.user_headers() {
        request.set_header(name, value.clone());
    }
    request.set_header(headers::CLIENT_REQUEST_ID, ctx.client_request_id());
    cmd.credentials
        .sign_request(&mut request, ctx)
        .map_err(terminal)?;
    Ok(request)
}

/// Failures before the request is sent are never retried.
fn terminal(err: StorageError) -> StorageError {
    err.with_retryable(false)
}

/// The service must echo the client request id it was sent. A response that
/// carries a different one belongs to another request.
fn check_client_request_id(sent: Option<&str>, head: &ResponseHead) -> Result<(), StorageError> {
    if let (Some(sent), Some(echoed)) = (sent, head.headers.get(headers::CLIENT_REQUEST_ID)) {
        if sent != echoed {
            return Err(StorageError::protocol_violation(format!(
                "response echoes client request id {} but {} was sent",
                echoed, sent
            ))
            .with_status(head.status));
        }
    }
    Ok(())
}

/// Pending error for a non-success status. A 404 from the secondary is worth
/// retrying when the mode can still fall back to the primary; the data may
/// simply not have replicated yet.
fn status_error(
    head: &ResponseHead,
    location: StorageLocation,
    mode: LocationMode,
) -> Option<StorageError> {
    if head.is_success() {
        return None;
    }
    let err = StorageError::from_response_head(head);
    let can_fall_back = matches!(
        mode,
        LocationMode::PrimaryThenSecondary | LocationMode::SecondaryThenPrimary
    );
    if head.status == 404 && location == StorageLocation::Secondary && can_fall_back {
        Some(err.with_retryable(true))
    } else {
        Some(err)
    }
}

fn body_checks<T>(
    head: &ResponseHead,
    method: Method,
    cmd: &StorageCommand<T>,
    options: &RequestOptions,
) -> BodyChecks {
    // HEAD responses describe the resource; there is no body to check.
    if method == Method::Head {
        return BodyChecks::default();
    }
    let validate = cmd.validate_md5 && !options.disable_content_md5_validation;
    BodyChecks {
        expected_length: head.headers.content_length(),
        expected_md5: if validate {
            head.headers.get(headers::CONTENT_MD5).map(str::to_string)
        } else {
            None
        },
        max_length: cmd.max_body_length,
    }
}
