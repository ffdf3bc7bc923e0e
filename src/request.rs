//! Request and response types shared by the proxy, the cache and the network
//!
//! Requests are keyed by method and absolute URL. Relative asset paths are
//! resolved against the configured origin before a key is formed, so a
//! manifest entry and a later page request for the same path meet on the same
//! key.

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

/// An outgoing resource request captured from the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL
    pub url: Url,
}

impl AssetRequest {
    /// Creates a request for an absolute URL
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    /// Creates a GET request for an absolute URL
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Resolves `path` against `origin` and builds a request for it
    ///
    /// Absolute URLs in `path` are kept as they are.
    ///
    /// # Returns
    /// * `Ok(AssetRequest)` with the resolved URL
    /// * `Err(String)` describing why the path could not be resolved
    pub fn resolve(origin: &Url, method: Method, path: &str) -> Result<Self, String> {
        let url = origin
            .join(path)
            .map_err(|e| format!("cannot resolve '{}' against {}: {}", path, origin, e))?;
        Ok(Self::new(method, url))
    }

    /// Returns the cache key for this request
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Lookup key for a stored response: `METHOD absolute-url`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    /// Builds the key for a method and URL
    pub fn new(method: &Method, url: &Url) -> Self {
        Self(format!("{} {}", method, url))
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A response as returned by the network or held in a cache generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// Final URL of the response
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Response headers in received order
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
    /// When this response was fetched from the network
    pub fetched_at: DateTime<Utc>,
}

impl StoredResponse {
    /// Creates a response with no headers, fetched now
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: Vec::new(),
            body: body.into(),
            fetched_at: Utc::now(),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the first header value with the given name, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
