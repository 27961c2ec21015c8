//! Structured storage error carrying a retryable flag.
//!
//! Every failure the engine surfaces, whether it came from the transport, a
//! status code, a command callback or the retry policy, is funneled into a
//! `StorageError` before the retry decision sees it.

mod extended;
mod translate;

pub use extended::{parse_json_error, ExtendedErrorInfo};
pub use translate::{translate_body_read, translate_io, translate_transport};

use std::fmt;
use std::sync::Arc;

use crate::response::ResponseHead;
use crate::retry::is_retryable_status;

/// Broad category of a storage error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Building the request failed before any network I/O.
    PreFlight,
    /// The service response cannot belong to this request (e.g. echoed client request id mismatch).
    ProtocolViolation,
    /// Connection failure, premature close, transport-level timeout.
    Transport,
    /// Non-success HTTP status.
    Http,
    /// The operation ran out of its time budget.
    Timeout,
    /// The caller cancelled the operation.
    Cancelled,
    /// A response could not be interpreted by the command.
    Parse,
    /// The retry policy misbehaved or picked an unusable location.
    Policy,
    /// Content-MD5 or length check failed while reading the body.
    Integrity,
    /// Reading the body or writing to the destination failed.
    Io,
}

/// Structured error returned by the execution engine.
#[derive(Debug, Clone)]
pub struct StorageError {
    kind: ErrorKind,
    message: String,
    retryable: bool,
    status: Option<u16>,
    extended: Option<ExtendedErrorInfo>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
            status: None,
            extended: None,
            source: None,
        }
    }

    pub fn pre_flight(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PreFlight, message, false)
    }

    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolViolation, message, false)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message, false)
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Policy, message, false)
    }

    /// Time budget exhausted. Retryable so the policy still gets a say;
    /// the expiry check refuses the retry anyway.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message, true)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation was canceled", false)
    }

    pub fn integrity(message: impl Into<String>, retryable: bool) -> Self {
        Self::new(ErrorKind::Integrity, message, retryable)
    }

    /// Classifies a response by status and headers alone. The body has not
    /// been read yet; extended error info starts from `x-ms-error-code`.
    pub fn from_response_head(head: &ResponseHead) -> Self {
        let status = head.status;
        let mut err = Self::new(
            ErrorKind::Http,
            format!("HTTP {} {}", status, head.reason.trim()).trim_end().to_string(),
            is_retryable_status(status),
        );
        err.status = Some(status);
        if let Some(code) = head.headers.get(crate::response::headers::ERROR_CODE) {
            err.extended = Some(ExtendedErrorInfo {
                error_code: Some(code.to_string()),
                ..ExtendedErrorInfo::default()
            });
        }
        err
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Merges parsed body details over whatever the headers provided.
    pub fn with_extended_info(mut self, info: ExtendedErrorInfo) -> Self {
        self.extended = Some(match self.extended.take() {
            Some(existing) => existing.merge(info),
            None => info,
        });
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn extended_info(&self) -> Option<&ExtendedErrorInfo> {
        self.extended.as_ref()
    }

    /// True for cancellations and transport timeouts, the errors that get
    /// promoted to `Timeout` once the operation's own expiry has passed.
    pub(crate) fn is_cancellation(&self) -> bool {
        match self.kind {
            ErrorKind::Cancelled | ErrorKind::Timeout => true,
            ErrorKind::Transport => self
                .source
                .as_deref()
                .and_then(|s| s.downcast_ref::<crate::transport::TransportError>())
                .map(|t| t.is_timeout())
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(info) = &self.extended {
            if let Some(code) = &info.error_code {
                write!(f, " ({})", code)?;
            }
            if let Some(msg) = &info.error_message {
                write!(f, ": {}", msg)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{ResponseHead, ResponseHeaders};

    fn head(status: u16, headers: &[(&str, &str)]) -> ResponseHead {
        ResponseHead {
            status,
            reason: "Reason".to_string(),
            headers: ResponseHeaders::from_pairs(headers.iter().copied()),
        }
    }

    #[test]
    fn status_errors_follow_retryable_statuses() {
        assert!(StorageError::from_response_head(&head(500, &[])).is_retryable());
        assert!(StorageError::from_response_head(&head(503, &[])).is_retryable());
        assert!(StorageError::from_response_head(&head(408, &[])).is_retryable());
        assert!(!StorageError::from_response_head(&head(501, &[])).is_retryable());
        assert!(!StorageError::from_response_head(&head(404, &[])).is_retryable());
        assert!(!StorageError::from_response_head(&head(409, &[])).is_retryable());
    }

    #[test]
    fn error_code_header_seeds_extended_info() {
        let err = StorageError::from_response_head(&head(404, &[("x-ms-error-code", "BlobNotFound")]));
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            err.extended_info().and_then(|i| i.error_code.as_deref()),
            Some("BlobNotFound")
        );
        assert!(err.to_string().contains("BlobNotFound"));
    }

    #[test]
    fn body_details_merge_over_header_code() {
        let err = StorageError::from_response_head(&head(409, &[("x-ms-error-code", "LeaseIdMissing")]))
            .with_extended_info(ExtendedErrorInfo {
                error_code: None,
                error_message: Some("There is currently a lease on the blob".into()),
                additional_details: Default::default(),
            });
        let info = err.extended_info().unwrap();
        assert_eq!(info.error_code.as_deref(), Some("LeaseIdMissing"));
        assert!(info.error_message.is_some());
    }

    #[test]
    fn cancelled_is_not_retryable() {
        let err = StorageError::cancelled();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(!err.is_retryable());
        assert!(err.is_cancellation());
    }
}
