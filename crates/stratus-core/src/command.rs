//! Storage command: everything the engine needs to run one logical
//! operation, including the callbacks that build requests and interpret
//! responses.
//!
//! A command is mutable during execution: the engine appends one
//! `RequestResult` per attempt and hands the body target to the recovery
//! action between attempts.

use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::context::OperationContext;
use crate::credentials::{Anonymous, Credentials};
use crate::error::{parse_json_error, ErrorKind, ExtendedErrorInfo, StorageError};
use crate::location::{CommandLocationMode, LocationMode, StorageUri};
use crate::request::{RequestBody, StorageRequest};
use crate::response::ResponseHead;
use crate::result::RequestResult;

/// Seekable sink for response bodies.
pub trait WriteSeek: Write + Seek + Send {}

impl<W: Write + Seek + Send> WriteSeek for W {}

/// Where a successful response body goes.
#[derive(Default)]
pub enum BodyTarget {
    /// Read and drop (length and MD5 are still checked).
    #[default]
    Discard,
    /// Keep the body in memory; handed to `post_process` as `ResponseContent::data`.
    Buffer,
    Writer(Box<dyn WriteSeek>),
}

impl fmt::Debug for BodyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyTarget::Discard => write!(f, "Discard"),
            BodyTarget::Buffer => write!(f, "Buffer"),
            BodyTarget::Writer(_) => write!(f, "Writer(..)"),
        }
    }
}

/// Body of a successful response, after it was fully read.
#[derive(Debug, Clone, Default)]
pub struct ResponseContent {
    /// Set when the target was `BodyTarget::Buffer`.
    pub data: Option<Vec<u8>>,
    pub length: u64,
    /// Content-MD5 computed while streaming, when validation was on.
    pub computed_md5: Option<String>,
}

pub type ContentBuilder =
    Box<dyn FnMut(&OperationContext) -> Result<Option<RequestBody>, StorageError> + Send>;

/// Builds the request for one attempt: endpoint (after credentials), server
/// timeout, content from the content builder.
pub type RequestBuilder = Box<
    dyn FnMut(
            &Url,
            Option<Duration>,
            Option<RequestBody>,
            &OperationContext,
        ) -> Result<StorageRequest, StorageError>
        + Send,
>;

/// Interprets the response head. The second argument is the pending error for
/// non-success statuses; returning `Ok` swallows it.
pub type PreProcess<T> = Box<
    dyn FnMut(
            &ResponseHead,
            Option<&StorageError>,
            &OperationContext,
        ) -> Result<Option<T>, StorageError>
        + Send,
>;

pub type PostProcess<T> = Box<
    dyn FnMut(
            Option<T>,
            &ResponseHead,
            ResponseContent,
            &OperationContext,
        ) -> Result<T, StorageError>
        + Send,
>;

pub type ErrorParser = Box<dyn FnMut(&mut dyn Read) -> Option<ExtendedErrorInfo> + Send>;

/// Runs before each retry, e.g. to rewind a partially written body target.
pub type RecoveryAction = Box<
    dyn FnMut(&mut BodyTarget, &StorageError, &OperationContext) -> Result<(), StorageError>
        + Send,
>;

pub type DisposeAction = Box<dyn FnOnce() + Send>;

pub struct StorageCommand<T> {
    pub(crate) uri: StorageUri,
    pub(crate) credentials: Arc<dyn Credentials>,
    /// Overrides the mode from the request options.
    pub(crate) location_mode: Option<LocationMode>,
    pub(crate) command_location_mode: CommandLocationMode,
    pub(crate) server_timeout: Option<Duration>,
    /// Set only by the caller. Without it each run derives its own deadline
    /// from `maximum_execution_time`.
    pub(crate) operation_expiry: Option<Instant>,
    pub(crate) build_content: Option<ContentBuilder>,
    pub(crate) build_request: RequestBuilder,
    pub(crate) pre_process: PreProcess<T>,
    pub(crate) post_process: Option<PostProcess<T>>,
    pub(crate) parse_error: ErrorParser,
    pub(crate) recovery_action: Option<RecoveryAction>,
    pub(crate) dispose_action: Option<DisposeAction>,
    pub(crate) body_target: BodyTarget,
    pub(crate) validate_md5: bool,
    pub(crate) max_body_length: Option<u64>,
    pub(crate) results: Vec<RequestResult>,
}

impl<T: 'static> StorageCommand<T> {
    /// Command with anonymous credentials, a pre-process that rethrows any
    /// pending error and JSON error parsing.
    pub fn new<F>(uri: StorageUri, build_request: F) -> Self
    where
        F: FnMut(
                &Url,
                Option<Duration>,
                Option<RequestBody>,
                &OperationContext,
            ) -> Result<StorageRequest, StorageError>
            + Send
            + 'static,
    {
        Self {
            uri,
            credentials: Arc::new(Anonymous),
            location_mode: None,
            command_location_mode: CommandLocationMode::default(),
            server_timeout: None,
            operation_expiry: None,
            build_content: None,
            build_request: Box::new(build_request),
            pre_process: Box::new(rethrow_pending::<T>),
            post_process: None,
            parse_error: Box::new(parse_json_error),
            recovery_action: None,
            dispose_action: None,
            body_target: BodyTarget::Discard,
            validate_md5: true,
            max_body_length: None,
            results: Vec::new(),
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_location_mode(mut self, mode: LocationMode) -> Self {
        self.location_mode = Some(mode);
        self
    }

    pub fn with_command_location_mode(mut self, mode: CommandLocationMode) -> Self {
        self.command_location_mode = mode;
        self
    }

    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = Some(timeout);
        self
    }

    pub fn with_operation_expiry(mut self, expiry: Instant) -> Self {
        self.operation_expiry = Some(expiry);
        self
    }

    /// Called once per attempt; the body it returns is moved into the request.
    pub fn with_content<F>(mut self, f: F) -> Self
    where
        F: FnMut(&OperationContext) -> Result<Option<RequestBody>, StorageError> + Send + 'static,
    {
        self.build_content = Some(Box::new(f));
        self
    }

    pub fn with_pre_process<F>(mut self, f: F) -> Self
    where
        F: FnMut(&ResponseHead, Option<&StorageError>, &OperationContext) -> Result<Option<T>, StorageError>
            + Send
            + 'static,
    {
        self.pre_process = Box::new(f);
        self
    }

    pub fn with_post_process<F>(mut self, f: F) -> Self
    where
        F: FnMut(Option<T>, &ResponseHead, ResponseContent, &OperationContext) -> Result<T, StorageError>
            + Send
            + 'static,
    {
        self.post_process = Some(Box::new(f));
        self
    }

    pub fn with_error_parser<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut dyn Read) -> Option<ExtendedErrorInfo> + Send + 'static,
    {
        self.parse_error = Box::new(f);
        self
    }

    pub fn with_recovery_action<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut BodyTarget, &StorageError, &OperationContext) -> Result<(), StorageError>
            + Send
            + 'static,
    {
        self.recovery_action = Some(Box::new(f));
        self
    }

    /// Runs once, after the operation succeeded.
    pub fn with_dispose_action(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.dispose_action = Some(Box::new(f));
        self
    }

    pub fn with_body_target(mut self, target: BodyTarget) -> Self {
        self.body_target = target;
        self
    }

    /// Skip comparing the body against the response's `Content-MD5`.
    pub fn without_md5_validation(mut self) -> Self {
        self.validate_md5 = false;
        self
    }

    /// Fail (without retry) once a response body exceeds `max` bytes.
    pub fn with_max_body_length(mut self, max: u64) -> Self {
        self.max_body_length = Some(max);
        self
    }
}

impl<T> StorageCommand<T> {
    pub fn uri(&self) -> &StorageUri {
        &self.uri
    }

    pub fn operation_expiry(&self) -> Option<Instant> {
        self.operation_expiry
    }

    /// One record per attempt, in order.
    pub fn results(&self) -> &[RequestResult] {
        &self.results
    }

    pub fn current_result(&self) -> Option<&RequestResult> {
        self.results.last()
    }

    pub(crate) fn current_result_mut(&mut self) -> Option<&mut RequestResult> {
        self.results.last_mut()
    }

    pub fn body_target(&self) -> &BodyTarget {
        &self.body_target
    }

    /// Takes the body target back, leaving `Discard`.
    pub fn take_body_target(&mut self) -> BodyTarget {
        std::mem::take(&mut self.body_target)
    }
}

impl<T> fmt::Debug for StorageCommand<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCommand")
            .field("uri", &self.uri)
            .field("credentials", &self.credentials)
            .field("location_mode", &self.location_mode)
            .field("command_location_mode", &self.command_location_mode)
            .field("server_timeout", &self.server_timeout)
            .field("operation_expiry", &self.operation_expiry)
            .field("body_target", &self.body_target)
            .field("attempts", &self.results.len())
            .finish_non_exhaustive()
    }
}

fn rethrow_pending<T>(
    _: &ResponseHead,
    pending: Option<&StorageError>,
    _: &OperationContext,
) -> Result<Option<T>, StorageError> {
    match pending {
        Some(err) => Err(err.clone()),
        None => Ok(None),
    }
}

/// Recovery action that seeks a `Writer` target back to `start` so the next
/// attempt overwrites the partial body.
pub fn rewind_writer(
    start: u64,
) -> impl FnMut(&mut BodyTarget, &StorageError, &OperationContext) -> Result<(), StorageError> + Send
{
    move |target, _, _| {
        if let BodyTarget::Writer(w) = target {
            w.seek(SeekFrom::Start(start)).map_err(|e| {
                StorageError::new(ErrorKind::Io, "rewind body target", false).with_source(e)
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;
    use crate::response::ResponseHead;
    use std::io::Cursor;

    fn command() -> StorageCommand<u32> {
        let uri = StorageUri::primary_only(Url::parse("http://a.example/c/b").unwrap());
        StorageCommand::new(uri, |url, _, body, _| {
            Ok(StorageRequest::new(Method::Get, url.clone()).with_body(body))
        })
    }

    #[test]
    fn default_pre_process_rethrows_pending() {
        let mut cmd = command();
        let ctx = OperationContext::new();
        let head = ResponseHead::new(500, "Internal Server Error");
        let pending = StorageError::from_response_head(&head);
        let err = (cmd.pre_process)(&head, Some(&pending), &ctx).unwrap_err();
        assert_eq!(err.status(), Some(500));

        let ok = ResponseHead::new(200, "OK");
        assert_eq!((cmd.pre_process)(&ok, None, &ctx).unwrap(), None);
    }

    #[test]
    fn defaults() {
        let cmd = command();
        assert!(cmd.validate_md5);
        assert!(cmd.results().is_empty());
        assert!(cmd.current_result().is_none());
        assert!(matches!(cmd.body_target(), BodyTarget::Discard));
    }

    #[test]
    fn rewind_writer_seeks_to_start() {
        let mut target = BodyTarget::Writer(Box::new(Cursor::new(Vec::new())));
        if let BodyTarget::Writer(w) = &mut target {
            w.write_all(b"partial").unwrap();
        }
        let mut rewind = rewind_writer(0);
        rewind(&mut target, &StorageError::timeout("t"), &OperationContext::new()).unwrap();
        if let BodyTarget::Writer(w) = &mut target {
            assert_eq!(w.stream_position().unwrap(), 0);
        }
    }
}
