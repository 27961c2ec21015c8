//! Classify HTTP status and transport errors for retry decisions.

use crate::transport::TransportError;

/// High-level classification of a failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Operation timed out (connect/read) or the server returned 408.
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, premature close).
    Connection,
    /// Server error that is worth retrying.
    Http5xx(u16),
    /// The attempt was aborted through the cancel handle.
    Cancelled,
    /// Anything else (not retried).
    Other,
}

/// Classify an HTTP status code. 501 (not implemented) and 505 (version not
/// supported) will never succeed on retry, so they are `Other`.
pub fn classify_http_status(code: u16) -> FailureClass {
    match code {
        408 => FailureClass::Timeout,
        429 | 503 => FailureClass::Throttled,
        501 | 505 => FailureClass::Other,
        500..=599 => FailureClass::Http5xx(code),
        _ => FailureClass::Other,
    }
}

/// True if a response with this status may succeed when retried.
pub fn is_retryable_status(code: u16) -> bool {
    classify_http_status(code) != FailureClass::Other
}

/// Classify a curl error. The transport reports a cancelled transfer as
/// `TransportError::Cancelled`, so a callback abort seen here was not a
/// cancellation.
pub fn classify_curl_error(e: &curl::Error) -> FailureClass {
    if e.is_operation_timedout() {
        return FailureClass::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
        || e.is_ssl_connect_error()
    {
        return FailureClass::Connection;
    }
    FailureClass::Other
}

/// Classify a transport error.
pub fn classify_transport(e: &TransportError) -> FailureClass {
    match e {
        TransportError::Curl(ce) => classify_curl_error(ce),
        TransportError::Io(_) | TransportError::Closed(_) => FailureClass::Connection,
        TransportError::TimedOut => FailureClass::Timeout,
        TransportError::Cancelled => FailureClass::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_and_503_throttled() {
        assert_eq!(classify_http_status(429), FailureClass::Throttled);
        assert_eq!(classify_http_status(503), FailureClass::Throttled);
    }

    #[test]
    fn http_5xx_retryable_except_501_505() {
        assert!(matches!(classify_http_status(500), FailureClass::Http5xx(500)));
        assert!(matches!(classify_http_status(502), FailureClass::Http5xx(502)));
        assert_eq!(classify_http_status(501), FailureClass::Other);
        assert_eq!(classify_http_status(505), FailureClass::Other);
    }

    #[test]
    fn http_4xx_other_except_408() {
        assert_eq!(classify_http_status(404), FailureClass::Other);
        assert_eq!(classify_http_status(403), FailureClass::Other);
        assert_eq!(classify_http_status(408), FailureClass::Timeout);
        assert!(!is_retryable_status(412));
        assert!(is_retryable_status(408));
    }

    #[test]
    fn transport_errors() {
        assert_eq!(classify_transport(&TransportError::TimedOut), FailureClass::Timeout);
        assert_eq!(classify_transport(&TransportError::Cancelled), FailureClass::Cancelled);
        assert_eq!(
            classify_transport(&TransportError::Closed("eof".into())),
            FailureClass::Connection
        );
    }

    #[test]
    fn callback_abort_without_cancel_is_not_a_cancellation() {
        // CURLE_ABORTED_BY_CALLBACK
        let aborted = curl::Error::new(42);
        assert!(aborted.is_aborted_by_callback());
        assert_eq!(classify_curl_error(&aborted), FailureClass::Other);
        let upload = TransportError::Io(std::io::Error::new(std::io::ErrorKind::Other, "bad sector"));
        assert_ne!(classify_transport(&upload), FailureClass::Cancelled);
    }
}
