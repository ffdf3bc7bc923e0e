//! Network access for the proxy
//!
//! The `Fetcher` trait is the seam between the proxy and the network. The
//! `HttpFetcher` forwards requests with reqwest and hands the response back
//! whatever its status; deciding what counts as a failure is left to the
//! caller.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use thiserror::Error;

use crate::request::{AssetRequest, StoredResponse};

/// Errors that can occur while forwarding a request to the network
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The request URL could not be used
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    /// The network could not be reached
    #[error("Network unreachable: {0}")]
    Unreachable(String),
}

/// Forwards requests to the network
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs one network request
    ///
    /// Any HTTP status is a successful fetch; only transport-level failures
    /// are errors.
    async fn fetch(&self, request: &AssetRequest) -> Result<StoredResponse, FetchError>;
}

/// Fetcher backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    /// Create a new HttpFetcher with default settings
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a new HttpFetcher with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<StoredResponse, FetchError> {
        if !matches!(request.url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(request.url.to_string()));
        }

        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await?;

        let url = response.url().to_string();
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(StoredResponse {
            url,
            status,
            headers,
            body,
            fetched_at: Utc::now(),
        })
    }
}
