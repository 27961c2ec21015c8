//! Operation context: identity, user headers, cancellation and events for
//! one logical operation.

use std::fmt;
use std::time::Duration;
use url::Url;

use crate::cancel::CancelHandle;
use crate::location::{LocationMode, StorageLocation};
use crate::request::Method;

/// Observed when a request is about to go out or a response head came back.
#[derive(Debug)]
pub struct RequestEvent<'a> {
    pub client_request_id: &'a str,
    /// Retry count of the attempt (0 for the first).
    pub attempt: u32,
    pub location: StorageLocation,
    pub method: Method,
    pub url: &'a Url,
    /// Set for response events only.
    pub status: Option<u16>,
}

/// Observed when the engine has decided to retry.
#[derive(Debug)]
pub struct RetryEvent<'a> {
    pub client_request_id: &'a str,
    /// Retry count of the upcoming attempt.
    pub retry_count: u32,
    pub delay: Duration,
    pub target_location: StorageLocation,
    pub location_mode: LocationMode,
    pub last_error: &'a str,
}

type RequestHook = Box<dyn Fn(&RequestEvent<'_>) + Send + Sync>;
type RetryHook = Box<dyn Fn(&RetryEvent<'_>) + Send + Sync>;

/// Per-operation context shared with every command callback.
pub struct OperationContext {
    client_request_id: String,
    user_headers: Vec<(String, String)>,
    cancel: CancelHandle,
    on_sending_request: Vec<RequestHook>,
    on_response_received: Vec<RequestHook>,
    on_retrying: Vec<RetryHook>,
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationContext {
    /// New context with a random client request id.
    pub fn new() -> Self {
        Self {
            client_request_id: uuid::Uuid::new_v4().to_string(),
            user_headers: Vec::new(),
            cancel: CancelHandle::new(),
            on_sending_request: Vec::new(),
            on_response_received: Vec::new(),
            on_retrying: Vec::new(),
        }
    }

    pub fn with_client_request_id(mut self, id: impl Into<String>) -> Self {
        self.client_request_id = id.into();
        self
    }

    /// Header added to every request of the operation.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_sending_request(
        &mut self,
        hook: impl Fn(&RequestEvent<'_>) + Send + Sync + 'static,
    ) -> &mut Self {
        self.on_sending_request.push(Box::new(hook));
        self
    }

    pub fn on_response_received(
        &mut self,
        hook: impl Fn(&RequestEvent<'_>) + Send + Sync + 'static,
    ) -> &mut Self {
        self.on_response_received.push(Box::new(hook));
        self
    }

    pub fn on_retrying(&mut self, hook: impl Fn(&RetryEvent<'_>) + Send + Sync + 'static) -> &mut Self {
        self.on_retrying.push(Box::new(hook));
        self
    }

    pub fn client_request_id(&self) -> &str {
        &self.client_request_id
    }

    pub fn user_headers(&self) -> &[(String, String)] {
        &self.user_headers
    }

    /// Handle the caller can use to abort the operation from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub(crate) fn sending_request(&self, event: &RequestEvent<'_>) {
        for hook in &self.on_sending_request {
            hook(event);
        }
    }

    pub(crate) fn response_received(&self, event: &RequestEvent<'_>) {
        for hook in &self.on_response_received {
            hook(event);
        }
    }

    pub(crate) fn retrying(&self, event: &RetryEvent<'_>) {
        for hook in &self.on_retrying {
            hook(event);
        }
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("client_request_id", &self.client_request_id)
            .field("user_headers", &self.user_headers)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}
