//! Response head (status + headers) and the deferred body stream.

use std::fmt;
use std::io::{self, Cursor, Read};

/// Header names the engine reads or writes.
pub mod headers {
    pub const CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";
    pub const REQUEST_ID: &str = "x-ms-request-id";
    pub const ERROR_CODE: &str = "x-ms-error-code";
    pub const CONTENT_MD5: &str = "content-md5";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const ETAG: &str = "etag";
    pub const DATE: &str = "date";
}

/// Response headers with case-insensitive lookup. Order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders(Vec<(String, String)>);

impl ResponseHeaders {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn content_length(&self) -> Option<u64> {
        self.get(headers::CONTENT_LENGTH)
            .and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Status line and headers, available before the body is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: ResponseHeaders,
}

impl ResponseHead {
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: ResponseHeaders::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse raw header lines as delivered by the transport. A new status
    /// line (redirect hop, `100 Continue`) discards everything before it.
    pub fn parse(lines: &[String]) -> Option<ResponseHead> {
        let mut head: Option<ResponseHead> = None;
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with("HTTP/") {
                let mut parts = line.splitn(3, ' ');
                let _version = parts.next();
                let status = parts.next().and_then(|s| s.parse::<u16>().ok())?;
                let reason = parts.next().unwrap_or("").to_string();
                head = Some(ResponseHead::new(status, reason));
                continue;
            }
            if let (Some(h), Some((name, value))) = (head.as_mut(), line.split_once(':')) {
                h.headers.insert(name.trim(), value.trim());
            }
        }
        head
    }
}

/// Response body stream. Dropping it releases the underlying response.
pub struct ResponseBody(Box<dyn Read + Send>);

impl ResponseBody {
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self(Box::new(reader))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(Box::new(Cursor::new(bytes)))
    }

    pub fn empty() -> Self {
        Self::from_bytes(Vec::new())
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseBody")
    }
}

/// A response whose headers have been read and whose body has not.
#[derive(Debug)]
pub struct StorageResponse {
    pub head: ResponseHead,
    pub body: ResponseBody,
}

impl StorageResponse {
    pub fn new(head: ResponseHead, body: ResponseBody) -> Self {
        Self { head, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_status_and_headers() {
        let head = ResponseHead::parse(&lines(&[
            "HTTP/1.1 200 OK",
            "Content-Length: 12345",
            "x-ms-request-id: abc",
        ]))
        .unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.reason, "OK");
        assert_eq!(head.headers.content_length(), Some(12345));
        assert_eq!(head.headers.get("X-MS-REQUEST-ID"), Some("abc"));
    }

    #[test]
    fn later_status_line_replaces_earlier() {
        let head = ResponseHead::parse(&lines(&[
            "HTTP/1.1 100 Continue",
            "",
            "HTTP/1.1 503 Server Busy",
            "Retry-After: 1",
        ]))
        .unwrap();
        assert_eq!(head.status, 503);
        assert_eq!(head.reason, "Server Busy");
        assert_eq!(head.headers.get("retry-after"), Some("1"));
        assert_eq!(head.headers.iter().count(), 1);
    }

    #[test]
    fn header_values_keep_colons() {
        let head = ResponseHead::parse(&lines(&[
            "HTTP/1.1 200 OK",
            "Date: Wed, 21 Oct 2015 07:28:00 GMT",
        ]))
        .unwrap();
        assert_eq!(head.headers.get("date"), Some("Wed, 21 Oct 2015 07:28:00 GMT"));
    }

    #[test]
    fn no_status_line_is_none() {
        assert!(ResponseHead::parse(&lines(&["Content-Length: 1"])).is_none());
    }
}
