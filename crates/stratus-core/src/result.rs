//! Per-attempt result records.

use serde::Serialize;
use std::time::SystemTime;

use crate::error::{ExtendedErrorInfo, StorageError};
use crate::location::StorageLocation;
use crate::response::{headers, ResponseHead};

/// What happened during one attempt. One record is appended per attempt,
/// including attempts that fail before anything is sent.
#[derive(Debug, Clone, Serialize)]
pub struct RequestResult {
    pub http_status_code: Option<u16>,
    pub http_status_message: Option<String>,
    /// Request id assigned by the service (`x-ms-request-id`).
    pub service_request_id: Option<String>,
    pub content_md5: Option<String>,
    pub etag: Option<String>,
    /// Service `Date` header, verbatim.
    pub request_date: Option<String>,
    pub start_time: SystemTime,
    pub end_time: Option<SystemTime>,
    pub target_location: StorageLocation,
    /// Body bytes received (success bodies and drained error bodies).
    pub bytes_received: u64,
    pub extended_error: Option<ExtendedErrorInfo>,
    pub error_message: Option<String>,
}

impl RequestResult {
    pub fn started(target_location: StorageLocation) -> Self {
        Self {
            http_status_code: None,
            http_status_message: None,
            service_request_id: None,
            content_md5: None,
            etag: None,
            request_date: None,
            start_time: SystemTime::now(),
            end_time: None,
            target_location,
            bytes_received: 0,
            extended_error: None,
            error_message: None,
        }
    }

    /// Captures the status line and the bookkeeping headers.
    pub(crate) fn record_head(&mut self, head: &ResponseHead) {
        self.http_status_code = Some(head.status);
        self.http_status_message = Some(head.reason.clone());
        self.service_request_id = head.headers.get(headers::REQUEST_ID).map(str::to_string);
        self.content_md5 = head.headers.get(headers::CONTENT_MD5).map(str::to_string);
        self.etag = head.headers.get(headers::ETAG).map(str::to_string);
        self.request_date = head.headers.get(headers::DATE).map(str::to_string);
    }

    pub(crate) fn record_error(&mut self, err: &StorageError) {
        self.error_message = Some(err.to_string());
        if let Some(info) = err.extended_info() {
            self.extended_error = Some(info.clone());
        }
    }

    pub(crate) fn finish(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(SystemTime::now());
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_message.is_none()
    }
}
