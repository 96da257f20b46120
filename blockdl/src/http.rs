//! HTTP transport for ranged block requests.
//!
//! The [`RangeClient`] trait keeps the worker independent of the HTTP stack so
//! tests can serve bytes from memory. [`ReqwestRangeClient`] is the real
//! implementation on top of `reqwest::blocking`.

use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, CONTENT_LENGTH, RANGE, REFERER,
    USER_AGENT,
};
use reqwest::Url;
use tracing::debug;

use crate::config::{HeaderProfile, DEFAULT_READ_TIMEOUT};
use crate::error::TransportError;

/// HTTP status for a successful ranged response.
pub const PARTIAL_CONTENT: u16 = 206;

/// Response to a ranged GET.
///
/// The body is only read when `status` is 206; dropping the response closes
/// the underlying connection.
pub struct RangeResponse {
    pub status: u16,
    pub body: Box<dyn Read + Send>,
}

impl std::fmt::Debug for RangeResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Transport used by block workers.
pub trait RangeClient: Send + Sync {
    /// Total length of the resource.
    fn content_length(&self, url: &str) -> Result<u64, TransportError>;

    /// Issue `GET` with `Range: bytes=<offset>-`.
    fn get_from(&self, url: &str, offset: u64) -> Result<RangeResponse, TransportError>;
}

/// `scheme://host` of `url`, or an empty string if it does not parse.
pub fn referer_for(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => format!("{}://{}", parsed.scheme(), host),
            None => String::new(),
        },
        Err(_) => String::new(),
    }
}

/// Range header value for a request starting at `offset`.
pub fn range_header(offset: u64) -> String {
    format!("bytes={}-", offset)
}

/// Blocking reqwest client sending browser-like headers.
#[derive(Debug, Clone)]
pub struct ReqwestRangeClient {
    client: Client,
    headers: HeaderProfile,
    pub(crate) timeout: Duration,
}

impl ReqwestRangeClient {
    /// Create a client with the default timeout and headers.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_settings(DEFAULT_READ_TIMEOUT, HeaderProfile::default())
    }

    /// Create a client with a custom timeout and header profile.
    pub fn with_settings(timeout: Duration, headers: HeaderProfile) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            headers,
            timeout,
        })
    }

    fn parse_url(url: &str) -> Result<Url, TransportError> {
        Url::parse(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    fn request_headers(&self, url: &str, offset: u64) -> HeaderMap {
        let mut map = HeaderMap::new();
        let pairs = [
            (ACCEPT, self.headers.accept.clone()),
            (ACCEPT_LANGUAGE, self.headers.accept_language.clone()),
            (REFERER, referer_for(url)),
            (USER_AGENT, self.headers.user_agent.clone()),
            (CONNECTION, "Keep-Alive".to_string()),
            (RANGE, range_header(offset)),
        ];
        for (name, value) in pairs {
            // Values come from config; a non-ASCII one is dropped rather than failing the block.
            if let Ok(value) = HeaderValue::from_str(&value) {
                map.insert(name, value);
            }
        }
        map
    }

    fn map_send_error(&self, url: &str, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            TransportError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

impl RangeClient for ReqwestRangeClient {
    fn content_length(&self, url: &str) -> Result<u64, TransportError> {
        let parsed = Self::parse_url(url)?;
        let response = self
            .client
            .head(parsed)
            .header(USER_AGENT, self.headers.user_agent.as_str())
            .send()
            .map_err(|e| self.map_send_error(url, e))?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| TransportError::MissingLength {
                url: url.to_string(),
            })
    }

    fn get_from(&self, url: &str, offset: u64) -> Result<RangeResponse, TransportError> {
        let parsed = Self::parse_url(url)?;
        let response = self
            .client
            .get(parsed)
            .headers(self.request_headers(url, offset))
            .send()
            .map_err(|e| self.map_send_error(url, e))?;

        let status = response.status().as_u16();
        debug!(url = %url, offset, status, "Ranged request answered");

        Ok(RangeResponse {
            status,
            body: Box::new(response),
        })
    }
}
