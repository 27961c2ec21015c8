//! Outgoing request built fresh for each attempt.

use std::fmt;
use std::io::{Cursor, Read};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Put,
    Post,
    Delete,
    Merge,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Merge => "MERGE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body. A reader body is consumed by a single send, which is why
/// commands rebuild the body on every attempt.
pub enum RequestBody {
    Bytes(Vec<u8>),
    Reader {
        reader: Box<dyn Read + Send>,
        length: Option<u64>,
    },
}

impl RequestBody {
    pub fn from_reader(reader: impl Read + Send + 'static, length: Option<u64>) -> Self {
        RequestBody::Reader {
            reader: Box::new(reader),
            length,
        }
    }

    pub fn len(&self) -> Option<u64> {
        match self {
            RequestBody::Bytes(b) => Some(b.len() as u64),
            RequestBody::Reader { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    pub fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            RequestBody::Bytes(b) => Box::new(Cursor::new(b)),
            RequestBody::Reader { reader, .. } => reader,
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Bytes(b) => write!(f, "RequestBody::Bytes({} bytes)", b.len()),
            RequestBody::Reader { length, .. } => write!(f, "RequestBody::Reader({:?})", length),
        }
    }
}

/// One outgoing HTTP request.
#[derive(Debug)]
pub struct StorageRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl StorageRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Option<RequestBody>) -> Self {
        self.body = body;
        self
    }

    /// Sets a header, replacing any existing value with the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Adds the `timeout=<secs>` query parameter used for server-side timeouts.
/// Sub-second timeouts round up so the service never sees `timeout=0`.
pub fn append_server_timeout(url: &mut Url, timeout: Option<Duration>) {
    let Some(timeout) = timeout else {
        return;
    };
    let mut secs = timeout.as_secs();
    if timeout.subsec_nanos() > 0 || secs == 0 {
        secs += 1;
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "timeout")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("timeout", &secs.to_string());
}
