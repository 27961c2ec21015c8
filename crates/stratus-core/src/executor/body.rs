//! Response body streaming: success bodies into the command's target with
//! length and Content-MD5 checks, error bodies into a bounded buffer for the
//! error parser.

use std::io::{self, Read, Write};

use crate::cancel::CancelHandle;
use crate::checksum::{ContentMd5, BUF_SIZE};
use crate::command::{BodyTarget, ResponseContent};
use crate::error::{translate_body_read, translate_io, StorageError};
use crate::response::ResponseBody;

/// Error bodies are only read this far.
pub(crate) const MAX_ERROR_BODY: u64 = 64 * 1024;

#[derive(Debug, Clone, Default)]
pub(crate) struct BodyChecks {
    /// Content-Length announced by the response.
    pub(crate) expected_length: Option<u64>,
    /// Content-MD5 announced by the response; compared when set.
    pub(crate) expected_md5: Option<String>,
    pub(crate) max_length: Option<u64>,
}

/// Copies the body into `target`, checking cancellation between chunks.
pub(crate) fn copy_body(
    mut body: ResponseBody,
    target: &mut BodyTarget,
    checks: &BodyChecks,
    cancel: &CancelHandle,
) -> Result<ResponseContent, StorageError> {
    let mut hasher = checks.expected_md5.as_ref().map(|_| ContentMd5::new());
    let mut buffered = match target {
        BodyTarget::Buffer => Some(Vec::new()),
        _ => None,
    };
    let mut buf = vec![0u8; BUF_SIZE];
    let mut total: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(StorageError::cancelled());
        }
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) if cancel.is_cancelled() => return Err(StorageError::cancelled()),
            Err(e) => return Err(translate_body_read(e)),
        };
        total += n as u64;
        if let Some(max) = checks.max_length {
            if total > max {
                return Err(StorageError::integrity(
                    format!("response body exceeds the maximum length of {} bytes", max),
                    false,
                ));
            }
        }
        let chunk = &buf[..n];
        if let Some(h) = hasher.as_mut() {
            h.update(chunk);
        }
        match target {
            BodyTarget::Discard => {}
            BodyTarget::Buffer => {
                if let Some(b) = buffered.as_mut() {
                    b.extend_from_slice(chunk);
                }
            }
            BodyTarget::Writer(w) => w.write_all(chunk).map_err(|e| translate_io(e, false))?,
        }
    }

    if let BodyTarget::Writer(w) = target {
        w.flush().map_err(|e| translate_io(e, false))?;
    }

    if let Some(expected) = checks.expected_length {
        if total != expected {
            return Err(StorageError::integrity(
                format!(
                    "response body ended after {} of {} bytes",
                    total, expected
                ),
                true,
            ));
        }
    }

    let computed_md5 = hasher.map(ContentMd5::finish);
    if let (Some(expected), Some(actual)) = (&checks.expected_md5, &computed_md5) {
        if expected != actual {
            return Err(StorageError::integrity(
                format!(
                    "Content-MD5 mismatch: response header {}, computed {}",
                    expected, actual
                ),
                true,
            ));
        }
    }

    Ok(ResponseContent {
        data: buffered,
        length: total,
        computed_md5,
    })
}

/// Reads up to `MAX_ERROR_BODY` bytes of an error response. Read failures
/// just end the buffer; the status already carries the error.
pub(crate) fn drain_error_body(body: ResponseBody) -> Vec<u8> {
    let mut out = Vec::new();
    if let Err(e) = body.take(MAX_ERROR_BODY).read_to_end(&mut out) {
        tracing::debug!(error = %e, "error body read failed");
    }
    out
}
