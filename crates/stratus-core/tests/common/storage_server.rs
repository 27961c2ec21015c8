//! Minimal HTTP/1.1 server that plays back scripted replies for integration tests.
//!
//! Each connection carries one request (replies close the connection). The
//! client request id header is echoed unless a reply opts out, and every
//! request is recorded so tests can inspect what went over the wire.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use stratus_core::checksum::md5_base64;

const CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub reason: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub echo_client_request_id: bool,
    /// Sleep before answering (simulates a slow server).
    pub delay: Option<Duration>,
    /// Sleep between the flushed head and the body.
    pub body_delay: Option<Duration>,
}

impl Reply {
    pub fn status(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            headers: Vec::new(),
            body: Vec::new(),
            echo_client_request_id: true,
            delay: None,
            body_delay: None,
        }
    }

    pub fn ok(body: &[u8]) -> Self {
        Self::status(200, "OK").with_body(body)
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Adds a Content-MD5 header computed over the body.
    pub fn with_md5(self) -> Self {
        let md5 = md5_base64(&self.body);
        self.with_header("Content-MD5", &md5)
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sends the head at once and holds the body back for `delay`.
    pub fn body_after(mut self, delay: Duration) -> Self {
        self.body_delay = Some(delay);
        self
    }
}

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path and query, e.g. `/c/blob?timeout=30`.
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Handle to a running server. The server runs until the process exits.
#[derive(Clone)]
pub struct StorageServer {
    base: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StorageServer {
    /// Starts a server that answers requests with `replies` in order. Once the
    /// script is exhausted every request gets 501.
    pub fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let replies = Arc::new(Mutex::new(VecDeque::from(replies)));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let replies = Arc::clone(&replies);
                let recorded = Arc::clone(&recorded);
                thread::spawn(move || handle(stream, &replies, &recorded));
            }
        });
        Self {
            base: format!("http://127.0.0.1:{}", port),
            requests,
        }
    }

    /// Absolute URL for `path` (which starts with `/`).
    pub fn url(&self, path: &str) -> url::Url {
        url::Url::parse(&format!("{}{}", self.base, path)).unwrap()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn handle(
    mut stream: TcpStream,
    replies: &Mutex<VecDeque<Reply>>,
    recorded: &Mutex<Vec<RecordedRequest>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let request = match read_request(&mut stream) {
        Some(r) => r,
        None => return,
    };
    let reply = replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Reply::status(501, "Script Exhausted"));
    let echoed = request.header(CLIENT_REQUEST_ID).map(str::to_string);
    let is_head = request.method.eq_ignore_ascii_case("HEAD");
    recorded.lock().unwrap().push(request);

    if let Some(delay) = reply.delay {
        thread::sleep(delay);
    }
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reply.reason,
        reply.body.len()
    );
    if reply.echo_client_request_id {
        if let Some(id) = echoed {
            head.push_str(&format!("{}: {}\r\n", CLIENT_REQUEST_ID, id));
        }
    }
    for (k, v) in &reply.headers {
        head.push_str(&format!("{}: {}\r\n", k, v));
    }
    head.push_str("\r\n");
    let _ = stream.write_all(head.as_bytes());
    if let Some(delay) = reply.body_delay {
        let _ = stream.flush();
        thread::sleep(delay);
    }
    if !is_head {
        let _ = stream.write_all(&reply.body);
    }
    let _ = stream.flush();
}

/// Reads the request line, headers and a Content-Length body.
fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let header_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };
    let text = std::str::from_utf8(&buf[..header_end]).ok()?;
    let mut lines = text.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < length {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
        }
    }
    body.truncate(length);
    Some(RecordedRequest {
        method,
        target,
        headers,
        body,
    })
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
