//! libcurl transport.
//!
//! One easy handle per attempt, performed on its own thread. The header
//! callback hands the head back as soon as the final header block ends; body
//! chunks then flow through a bounded channel into the response body reader,
//! so a slow consumer stalls the transfer instead of growing a buffer.
//! Cancellation goes through the progress callback, which libcurl calls
//! frequently during a transfer and at least once per second when idle.

use std::io::{self, Read};
use std::str;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;
use std::time::Duration;

use curl::easy::{Easy, List, ReadError};

use super::{SendControl, Transport, TransportError};
use crate::cancel::CancelHandle;
use crate::request::{Method, StorageRequest};
use crate::response::{ResponseBody, ResponseHead, StorageResponse};

/// Body chunks the transfer thread may run ahead of the reader.
const BODY_CHANNEL_DEPTH: usize = 16;

/// libcurl options applied to every attempt.
#[derive(Debug, Clone, Copy)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Abort if throughput stays below `low_speed_limit` bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    /// Receive buffer size (None = libcurl default).
    pub buffer_size: Option<usize>,
    pub follow_redirects: bool,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            buffer_size: None,
            follow_redirects: false,
        }
    }
}

/// Blocking transport backed by libcurl easy handles.
#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    options: CurlOptions,
}

impl CurlTransport {
    pub fn new(options: CurlOptions) -> Self {
        Self { options }
    }

    fn configure(
        &self,
        easy: &mut Easy,
        request: &StorageRequest,
        control: &SendControl,
    ) -> Result<(), curl::Error> {
        easy.url(request.url.as_str())?;
        easy.follow_location(self.options.follow_redirects)?;
        easy.connect_timeout(self.options.connect_timeout)?;
        easy.low_speed_limit(self.options.low_speed_limit)?;
        easy.low_speed_time(self.options.low_speed_time)?;
        if let Some(sz) = self.options.buffer_size {
            easy.buffer_size(sz)?;
        }
        // libcurl treats 0 as "no timeout".
        if let Some(t) = control.timeout {
            easy.timeout(t.max(Duration::from_millis(1)))?;
        }
        easy.progress(true)?;

        let body_len = request.body.as_ref().and_then(|b| b.len());
        match request.method {
            Method::Get => easy.get(true)?,
            Method::Head => easy.nobody(true)?,
            Method::Post => {
                easy.post(true)?;
                easy.post_field_size(body_len.unwrap_or(0))?;
            }
            Method::Put | Method::Merge => {
                easy.upload(true)?;
                easy.in_filesize(body_len.unwrap_or(0))?;
                if request.method != Method::Put {
                    easy.custom_request(request.method.as_str())?;
                }
            }
            Method::Delete => easy.custom_request("DELETE")?,
        }

        let mut list = List::new();
        for (k, v) in &request.headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))?;
        }
        // Stop libcurl from inserting "Expect: 100-continue" on uploads.
        list.append("Expect:")?;
        easy.http_headers(list)?;
        Ok(())
    }
}

impl Transport for CurlTransport {
    fn send(
        &self,
        mut request: StorageRequest,
        control: &SendControl,
    ) -> Result<StorageResponse, TransportError> {
        if control.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let mut easy = Easy::new();
        self.configure(&mut easy, &request, control)?;

        let upload: Box<dyn Read + Send> = match request.body.take() {
            Some(body) => body.into_reader(),
            None => Box::new(io::empty()),
        };
        let (tx, rx) = mpsc::sync_channel(BODY_CHANNEL_DEPTH);
        let cancel = control.cancel.clone();
        let follow_redirects = self.options.follow_redirects;
        thread::Builder::new()
            .name("stratus-curl".to_string())
            .spawn(move || {
                let outcome = perform(&mut easy, upload, &tx, &cancel, follow_redirects);
                if let Err(e) = &outcome {
                    tracing::trace!(error = %e, "curl transfer failed");
                }
                // The reader may already be gone.
                let _ = tx.send(Event::Done(outcome));
            })?;

        match rx.recv() {
            Ok(Event::Head(lines)) => {
                let head = ResponseHead::parse(&lines).ok_or_else(|| {
                    TransportError::Closed("response had no status line".to_string())
                })?;
                tracing::trace!(status = head.status, "curl response head received");
                Ok(StorageResponse::new(
                    head,
                    ResponseBody::from_reader(ChannelBody::new(rx)),
                ))
            }
            Ok(Event::Done(Err(e))) => Err(e),
            Ok(_) => Err(TransportError::Closed(
                "response had no status line".to_string(),
            )),
            Err(_) => Err(TransportError::Closed(
                "transfer ended without a response".to_string(),
            )),
        }
    }
}

/// Sent by the transfer thread, in order: the head, body chunks, the outcome.
enum Event {
    Head(Vec<String>),
    Data(Vec<u8>),
    Done(Result<(), TransportError>),
}

/// Runs the transfer to completion on the current thread.
fn perform(
    easy: &mut Easy,
    mut upload: Box<dyn Read + Send>,
    tx: &SyncSender<Event>,
    cancel: &CancelHandle,
    follow_redirects: bool,
) -> Result<(), TransportError> {
    let mut lines: Vec<String> = Vec::new();
    let mut head_sent = false;
    let mut upload_error: Option<io::Error> = None;

    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            let line = match str::from_utf8(data) {
                Ok(s) => s.trim_end(),
                Err(_) => return true,
            };
            if !line.is_empty() {
                lines.push(line.to_string());
                return true;
            }
            if head_sent || !is_final_head(&lines, follow_redirects) {
                return true;
            }
            head_sent = true;
            tx.send(Event::Head(lines.clone())).is_ok()
        })?;
        // A short count aborts the transfer with a write error.
        transfer.write_function(|data| {
            if cancel.is_cancelled() {
                return Ok(0);
            }
            match tx.send(Event::Data(data.to_vec())) {
                Ok(()) => Ok(data.len()),
                Err(_) => Ok(0),
            }
        })?;
        transfer.read_function(|buf| {
            upload.read(buf).map_err(|e| {
                upload_error = Some(e);
                ReadError::Abort
            })
        })?;
        transfer.progress_function(|_, _, _, _| !cancel.is_cancelled())?;
        transfer.perform()
    };

    if let Some(e) = upload_error {
        return Err(TransportError::Io(e));
    }
    if let Err(e) = performed {
        if cancel.is_cancelled() && (e.is_aborted_by_callback() || e.is_write_error()) {
            return Err(TransportError::Cancelled);
        }
        if e.is_operation_timedout() {
            return Err(TransportError::TimedOut);
        }
        return Err(TransportError::Curl(e));
    }
    if !head_sent {
        tx.send(Event::Head(lines))
            .map_err(|_| TransportError::Closed("response abandoned".to_string()))?;
    }
    Ok(())
}

/// False for interim 1xx blocks and for redirects libcurl is about to follow.
fn is_final_head(lines: &[String], follow_redirects: bool) -> bool {
    let status = lines
        .iter()
        .rev()
        .find(|l| l.starts_with("HTTP/"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok());
    match status {
        Some(100..=199) => false,
        Some(300..=399) if follow_redirects => !has_location(lines),
        _ => true,
    }
}

fn has_location(lines: &[String]) -> bool {
    let block = lines
        .iter()
        .rposition(|l| l.starts_with("HTTP/"))
        .unwrap_or(0);
    lines[block..].iter().any(|l| {
        l.split_once(':')
            .map_or(false, |(name, _)| name.trim().eq_ignore_ascii_case("location"))
    })
}

/// Response body fed from the transfer thread. Dropping it makes the next
/// write callback abort the transfer.
struct ChannelBody {
    rx: Receiver<Event>,
    chunk: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl ChannelBody {
    fn new(rx: Receiver<Event>) -> Self {
        Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
            finished: false,
        }
    }
}

impl Read for ChannelBody {
    /// Transfer failures surface as `io::Error`s wrapping the `TransportError`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos == self.chunk.len() {
            if self.finished {
                return Ok(0);
            }
            match self.rx.recv() {
                Ok(Event::Data(data)) => {
                    self.chunk = data;
                    self.pos = 0;
                }
                Ok(Event::Done(Ok(()))) => self.finished = true,
                Ok(Event::Done(Err(e))) => {
                    self.finished = true;
                    let kind = if e.is_timeout() {
                        io::ErrorKind::TimedOut
                    } else {
                        io::ErrorKind::Other
                    };
                    return Err(io::Error::new(kind, e));
                }
                Ok(Event::Head(_)) => {}
                Err(_) => {
                    self.finished = true;
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "transfer thread exited mid-body",
                    ));
                }
            }
        }
        let n = (self.chunk.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelHandle;
    use url::Url;

    #[test]
    fn cancelled_before_send_is_cancelled() {
        let t = CurlTransport::default();
        let control = SendControl {
            cancel: CancelHandle::new(),
            timeout: None,
        };
        control.cancel.cancel();
        let req = StorageRequest::new(Method::Get, Url::parse("http://127.0.0.1:9/").unwrap());
        assert!(matches!(t.send(req, &control), Err(TransportError::Cancelled)));
    }

    #[test]
    fn connection_refused_is_curl_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let t = CurlTransport::default();
        let req = StorageRequest::new(
            Method::Get,
            Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap(),
        );
        match t.send(req, &SendControl::default()) {
            Err(TransportError::Curl(e)) => assert!(e.is_couldnt_connect()),
            other => panic!("expected connect failure, got {:?}", other),
        }
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn interim_and_followed_heads_are_not_final() {
        assert!(!is_final_head(&lines(&["HTTP/1.1 100 Continue"]), false));
        let redirect = lines(&["HTTP/1.1 302 Found", "Location: /elsewhere"]);
        assert!(!is_final_head(&redirect, true));
        assert!(is_final_head(&redirect, false));
        assert!(is_final_head(&lines(&["HTTP/1.1 304 Not Modified"]), true));
        let after_continue = lines(&["HTTP/1.1 100 Continue", "HTTP/1.1 201 Created"]);
        assert!(is_final_head(&after_continue, false));
    }
}
