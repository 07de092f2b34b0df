//! Blocking HTTP transport backed by `ureq`.

use crate::error::Result;
use crate::transport::{Response, Transport, find_header};
use std::time::Duration;

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("sous/", env!("CARGO_PKG_VERSION"));

/// How long to wait for a TCP/TLS connection before giving up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Real network transport.
///
/// Status codes are never turned into errors here; the downloader decides
/// what a 304, 206, or 404 means for the transfer at hand.
pub struct UreqTransport {
    agent: ureq::Agent,
    user_agent: String,
}

impl UreqTransport {
    /// Create a transport with the default user agent.
    #[must_use]
    pub fn new() -> Self {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    /// Create a transport that sends `user_agent` unless the caller
    /// supplies its own `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .build()
            .into();
        Self {
            agent,
            user_agent: user_agent.into(),
        }
    }

    /// The user agent sent by default.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<Response> {
        let mut request = self.agent.get(url);
        if find_header(headers, "user-agent").is_none() {
            request = request.header("User-Agent", self.user_agent.as_str());
        }
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.call()?;

        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let content_length = response.body().content_length();
        let body = response.into_body().into_reader();

        log::debug!("GET {url} -> {status}");

        Ok(Response {
            status,
            headers: response_headers,
            content_length,
            body: Box::new(body),
        })
    }
}
