//! HTTP transport abstraction.
//!
//! The downloader only needs one capability from the network: issue a GET with
//! a set of headers and hand back the status, headers, and a streaming body.
//! [`http::UreqTransport`] does that over the real network; [`MockTransport`]
//! serves canned bodies from memory so transfer semantics can be tested
//! without sockets.
//!
//! ```
//! use prefetch::transport::{MockRoute, MockTransport, Transport};
//!
//! let mock = MockTransport::new();
//! mock.add_route("https://example.com/a.txt", MockRoute::new(b"hello".to_vec()));
//!
//! let response = mock.get("https://example.com/a.txt", &[]).unwrap();
//! assert_eq!(response.status, 200);
//! ```

pub mod http;

use crate::error::Result;
use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub use http::UreqTransport;

/// A response whose body has not been read yet.
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, names lowercased.
    pub headers: Vec<(String, String)>,
    /// Declared body length, when the server sent one.
    pub content_length: Option<u64>,
    /// Streaming body.
    pub body: Box<dyn Read + Send>,
}

impl Response {
    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Something that can perform a GET request.
///
/// Implementations must be shareable across worker threads. Non-2xx statuses
/// are returned as responses, not errors; only transport-level failures
/// (DNS, TLS, connection reset) are errors.
pub trait Transport: Send + Sync {
    /// Issue a GET for `url` with the given request headers.
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<Response>;
}

/// Find a request header by case-insensitive name.
pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

// =============================================================================
// Mock transport
// =============================================================================

/// Canned behaviour for one URL served by [`MockTransport`].
#[derive(Debug, Clone, Default)]
pub struct MockRoute {
    /// Full body of the resource.
    pub body: Vec<u8>,
    /// ETag the server advertises; a matching `If-None-Match` yields 304.
    pub etag: Option<String>,
    /// Whether `Range: bytes=N-` is answered with 206.
    pub honor_range: bool,
    /// Force this status with an empty body.
    pub status: Option<u16>,
    /// Sleep before answering.
    pub delay: Option<Duration>,
    /// Reset the connection after sending this many body bytes.
    pub drop_after: Option<usize>,
}

impl MockRoute {
    /// A route answering 200 with `body`, honouring ranges.
    #[must_use]
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            honor_range: true,
            ..Self::default()
        }
    }

    /// A route that always answers with `status` and no body.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Advertise an ETag.
    #[must_use]
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Ignore `Range` headers and always send the full body with 200.
    #[must_use]
    pub fn ignoring_range(mut self) -> Self {
        self.honor_range = false;
        self
    }

    /// Delay the answer.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Cut the body off after `bytes`, as a dropped connection would.
    #[must_use]
    pub fn dropping_after(mut self, bytes: usize) -> Self {
        self.drop_after = Some(bytes);
        self
    }
}

/// A request observed by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Requested URL.
    pub url: String,
    /// Headers sent with it.
    pub headers: Vec<(String, String)>,
}

/// In-memory transport for tests.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<HashMap<String, MockRoute>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockTransport {
    /// Create an empty mock; unknown URLs answer 404.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `route` for `url`.
    pub fn add_route(&self, url: impl Into<String>, route: MockRoute) {
        lock(&self.routes).insert(url.into(), route);
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Number of requests received for `url`.
    pub fn request_count(&self, url: &str) -> usize {
        lock(&self.requests).iter().filter(|r| r.url == url).count()
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<Response> {
        lock(&self.requests).push(RecordedRequest {
            url: url.to_string(),
            headers: headers.to_vec(),
        });

        let Some(route) = lock(&self.routes).get(url).cloned() else {
            return Ok(canned(404, Vec::new(), Vec::new()));
        };

        if let Some(delay) = route.delay {
            std::thread::sleep(delay);
        }

        if let Some(status) = route.status {
            return Ok(canned(status, Vec::new(), Vec::new()));
        }

        let mut response_headers = Vec::new();
        if let Some(etag) = &route.etag {
            response_headers.push(("etag".to_string(), etag.clone()));
            if find_header(headers, "if-none-match") == Some(etag.as_str()) {
                return Ok(canned(304, response_headers, Vec::new()));
            }
        }

        if route.honor_range
            && let Some(offset) = find_header(headers, "range").and_then(parse_open_range)
        {
            let start = (offset as usize).min(route.body.len());
            let total = route.body.len();
            response_headers.push((
                "content-range".to_string(),
                format!("bytes {}-{}/{}", start, total.saturating_sub(1), total),
            ));
            let body = route.body[start..].to_vec();
            return Ok(cut_off(canned(206, response_headers, body), route.drop_after));
        }

        Ok(cut_off(canned(200, response_headers, route.body), route.drop_after))
    }
}

/// Reader that fails the way a reset connection does.
struct Reset;

impl Read for Reset {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::ErrorKind::ConnectionReset.into())
    }
}

fn cut_off(mut response: Response, after: Option<usize>) -> Response {
    if let Some(limit) = after {
        response.body = Box::new(response.body.take(limit as u64).chain(Reset));
    }
    response
}

/// Parse `bytes=N-` into `N`.
fn parse_open_range(value: &str) -> Option<u64> {
    value
        .strip_prefix("bytes=")?
        .strip_suffix('-')?
        .parse()
        .ok()
}

fn canned(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Response {
    Response {
        status,
        headers,
        content_length: Some(body.len() as u64),
        body: Box::new(Cursor::new(body)),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
