//! Scripted transport for engine tests: replays canned responses in order
//! and records what was sent.

use std::collections::VecDeque;
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;

use super::{SendControl, Transport, TransportError};
use crate::request::{Method, StorageRequest};
use crate::response::{headers, ResponseBody, ResponseHead, ResponseHeaders, StorageResponse};

pub(crate) enum Step {
    Respond {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        /// Override for the echoed client request id; `None` echoes what was sent.
        echo: Option<String>,
    },
    Fail(Box<dyn Fn() -> TransportError + Send + Sync>),
    /// Block until cancelled or the attempt timeout elapses.
    Hang,
}

impl Step {
    pub(crate) fn status(status: u16) -> Self {
        Step::Respond {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            echo: None,
        }
    }

    pub(crate) fn body(status: u16, body: &[u8]) -> Self {
        Step::Respond {
            status,
            headers: Vec::new(),
            body: body.to_vec(),
            echo: None,
        }
    }

    pub(crate) fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Step::Respond { headers, .. } = &mut self {
            headers.push((name.to_string(), value.to_string()));
        }
        self
    }

    pub(crate) fn with_echo(mut self, id: &str) -> Self {
        if let Step::Respond { echo, .. } = &mut self {
            *echo = Some(id.to_string());
        }
        self
    }

    pub(crate) fn connection_reset() -> Self {
        Step::Fail(Box::new(|| TransportError::Closed("connection reset".into())))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SentRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

struct TrackedBody {
    inner: Cursor<Vec<u8>>,
    dropped: Arc<AtomicUsize>,
}

impl Read for TrackedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    sent: Mutex<Vec<SentRequest>>,
    responses: AtomicUsize,
    bodies_dropped: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        })
    }

    pub(crate) fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Responses handed out so far.
    pub(crate) fn responses(&self) -> usize {
        self.responses.load(Ordering::SeqCst)
    }

    /// Response bodies released so far.
    pub(crate) fn bodies_dropped(&self) -> usize {
        self.bodies_dropped.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: StorageRequest,
        control: &SendControl,
    ) -> Result<StorageResponse, TransportError> {
        let client_id = request
            .header(headers::CLIENT_REQUEST_ID)
            .map(str::to_string);
        let body = request.body.map(|b| {
            let mut buf = Vec::new();
            b.into_reader().read_to_end(&mut buf).unwrap();
            buf
        });
        self.sent.lock().unwrap().push(SentRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body,
            timeout: control.timeout,
        });

        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted transport ran out of steps");
        match step {
            Step::Respond {
                status,
                headers: extra,
                body,
                echo,
            } => {
                let mut response_headers = ResponseHeaders::from_pairs(extra);
                if let Some(id) = echo.or(client_id) {
                    response_headers.insert(headers::CLIENT_REQUEST_ID, id);
                }
                if response_headers.get(headers::CONTENT_LENGTH).is_none() {
                    response_headers.insert(headers::CONTENT_LENGTH, body.len().to_string());
                }
                self.responses.fetch_add(1, Ordering::SeqCst);
                let head = ResponseHead {
                    status,
                    reason: "Scripted".to_string(),
                    headers: response_headers,
                };
                Ok(StorageResponse::new(
                    head,
                    ResponseBody::from_reader(TrackedBody {
                        inner: Cursor::new(body),
                        dropped: Arc::clone(&self.bodies_dropped),
                    }),
                ))
            }
            Step::Fail(make) => Err(make()),
            Step::Hang => {
                let limit = control.timeout.unwrap_or(Duration::from_secs(10));
                if control.cancel.wait_timeout(limit) {
                    Err(TransportError::Cancelled)
                } else {
                    Err(TransportError::TimedOut)
                }
            }
        }
    }
}
