//! HTTP transport used by the execution engine.
//!
//! A transport sends one request and returns once the response headers are
//! in, leaving the body to be read by the engine. It must honor the cancel
//! handle and timeout in `SendControl`. A single transport instance is
//! shared across unrelated operations, so implementations are `Send + Sync`.

mod libcurl;
#[cfg(test)]
pub(crate) mod scripted;

pub use self::libcurl::{CurlOptions, CurlTransport};

use std::time::Duration;

use crate::cancel::CancelHandle;
use crate::request::StorageRequest;
use crate::response::StorageResponse;

/// Error raised by a transport. Before the head it is returned from `send`;
/// after it, the body reader carries it inside an `io::Error`.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("curl: {0}")]
    Curl(#[from] ::curl::Error),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("request timed out")]
    TimedOut,
    #[error("request canceled")]
    Cancelled,
    #[error("connection closed: {0}")]
    Closed(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::TimedOut => true,
            TransportError::Curl(e) => e.is_operation_timedout(),
            _ => false,
        }
    }
}

/// Per-attempt controls handed to the transport.
#[derive(Debug, Clone, Default)]
pub struct SendControl {
    pub cancel: CancelHandle,
    /// Wall-clock limit for the whole exchange; `None` = unbounded.
    pub timeout: Option<Duration>,
}

/// Blocking HTTP transport.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: StorageRequest,
        control: &SendControl,
    ) -> Result<StorageResponse, TransportError>;
}
