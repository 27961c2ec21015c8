//! Translation of raw transport and I/O failures into `StorageError`.

use super::{ErrorKind, StorageError};
use crate::retry::{classify_transport, FailureClass};
use crate::transport::TransportError;

/// Translates a transport failure. `expired` tells whether the operation's
/// own expiry has passed, in which case cancellations and timeouts are
/// reported as `Timeout` instead of as caller cancellation.
pub fn translate_transport(err: TransportError, expired: bool) -> StorageError {
    let class = classify_transport(&err);
    match class {
        FailureClass::Cancelled if expired => {
            StorageError::timeout("the operation did not complete within the maximum execution time")
                .with_source(err)
        }
        FailureClass::Cancelled => StorageError::cancelled().with_source(err),
        FailureClass::Timeout if expired => {
            StorageError::timeout("the operation did not complete within the maximum execution time")
                .with_source(err)
        }
        FailureClass::Timeout
        | FailureClass::Connection
        | FailureClass::Throttled
        | FailureClass::Http5xx(_) => {
            StorageError::new(ErrorKind::Transport, err.to_string(), true).with_source(err)
        }
        FailureClass::Other => {
            StorageError::new(ErrorKind::Transport, err.to_string(), false).with_source(err)
        }
    }
}

/// Translates an I/O failure while streaming a body. A read error on the
/// response is a premature close and worth retrying; a write error on the
/// caller's destination is not.
pub fn translate_io(err: std::io::Error, reading_response: bool) -> StorageError {
    let message = if reading_response {
        format!("reading response body: {}", err)
    } else {
        format!("writing to destination: {}", err)
    };
    StorageError::new(ErrorKind::Io, message, reading_response).with_source(err)
}

/// Translates a failed read of a response body. Transports that fail after
/// the head wrap their `TransportError` in the `io::Error`; those get the
/// transport translation, anything else is a premature close.
pub fn translate_body_read(err: std::io::Error) -> StorageError {
    let from_transport = err
        .get_ref()
        .map_or(false, |inner| inner.is::<TransportError>());
    if !from_transport {
        return translate_io(err, true);
    }
    match err.into_inner().map(|inner| inner.downcast::<TransportError>()) {
        Some(Ok(transport)) => translate_transport(*transport, false),
        Some(Err(inner)) => translate_io(std::io::Error::new(std::io::ErrorKind::Other, inner), true),
        None => StorageError::new(ErrorKind::Io, "reading response body", true),
    }
}
