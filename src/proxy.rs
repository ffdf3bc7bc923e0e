//! The offline asset proxy
//!
//! `install` pre-caches the asset manifest into the configured generation, all
//! or nothing. `intercept` answers a request from any stored generation and
//! falls back to the network on a miss without writing the result back.

use std::sync::Arc;

use futures::future::try_join_all;
use reqwest::Method;
use tracing::{debug, info, warn};

use crate::cache::CacheStorage;
use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::network::Fetcher;
use crate::request::{AssetRequest, RequestKey, StoredResponse};

/// Outcome of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Generation that was populated
    pub cache_name: String,
    /// Keys written, in manifest order
    pub cached: Vec<RequestKey>,
}

/// Where an intercepted response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
}

/// Cache-first proxy over an injected storage and fetcher
pub struct OfflineProxy {
    config: ProxyConfig,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
}

impl OfflineProxy {
    /// Creates a proxy
    pub fn new(
        config: ProxyConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
        }
    }

    /// Resolves a page-relative path into a request against the configured origin
    pub fn request_for(&self, method: Method, path: &str) -> Result<AssetRequest, String> {
        AssetRequest::resolve(&self.config.origin, method, path)
    }

    /// Whether the configured generation already holds every manifest asset
    pub async fn is_installed(&self) -> ProxyResult<bool> {
        if !self.storage.has(&self.config.cache_name).await? {
            return Ok(false);
        }
        let stored = self.storage.keys(&self.config.cache_name).await?;
        for path in &self.config.manifest {
            let Ok(request) = self.request_for(Method::GET, path) else {
                return Ok(false);
            };
            if stored.binary_search(&request.key()).is_err() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Opens the cache generation and stores every manifest asset in it
    ///
    /// All manifest fetches run concurrently. The first failure, whether a
    /// transport error or a non-2xx status, fails the install and nothing is
    /// written.
    ///
    /// # Returns
    /// * `Ok(InstallReport)` once every asset is stored
    /// * `Err(ProxyError::InstallFailed)` if any asset could not be fetched
    /// * `Err(ProxyError::Storage)` if the storage rejected the open or write
    pub async fn install(&self) -> ProxyResult<InstallReport> {
        let cache_name = &self.config.cache_name;
        info!(
            "Installing offline proxy: caching {} assets into {}",
            self.config.manifest.len(),
            cache_name
        );

        self.storage.open(cache_name).await?;

        let requests = self
            .config
            .manifest
            .iter()
            .map(|path| {
                self.request_for(Method::GET, path)
                    .map(|request| (path.as_str(), request))
                    .map_err(|reason| ProxyError::InstallFailed {
                        asset: path.clone(),
                        reason,
                    })
            })
            .collect::<ProxyResult<Vec<_>>>()?;

        let fetches = requests
            .iter()
            .map(|(path, request)| self.fetch_asset(path, request));
        let entries = match try_join_all(fetches).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Offline proxy install failed: {}", e);
                return Err(e);
            }
        };

        let cached: Vec<RequestKey> = entries.iter().map(|(key, _)| key.clone()).collect();
        self.storage.put_all(cache_name, entries).await?;

        info!("Offline proxy installed: {} assets cached", cached.len());
        Ok(InstallReport {
            cache_name: cache_name.clone(),
            cached,
        })
    }

    async fn fetch_asset(
        &self,
        path: &str,
        request: &AssetRequest,
    ) -> ProxyResult<(RequestKey, StoredResponse)> {
        let response = self
            .fetcher
            .fetch(request)
            .await
            .map_err(|e| ProxyError::InstallFailed {
                asset: path.to_string(),
                reason: e.to_string(),
            })?;

        if !response.is_ok() {
            return Err(ProxyError::InstallFailed {
                asset: path.to_string(),
                reason: format!("HTTP {}", response.status),
            });
        }

        debug!("Fetched {} ({} bytes)", request.url, response.body.len());
        Ok((request.key(), response))
    }

    /// Answers a request from the cache, or from the network on a miss
    ///
    /// # Returns
    /// * `Ok(StoredResponse)` from any generation holding the key, or the
    ///   network response verbatim on a miss
    /// * `Err(ProxyError::NetworkFetchFailed)` if there was no hit and the
    ///   network forward failed
    pub async fn intercept(&self, request: &AssetRequest) -> ProxyResult<StoredResponse> {
        self.intercept_with_source(request)
            .await
            .map(|(response, _)| response)
    }

    /// Same as `intercept`, also reporting where the response came from
    pub async fn intercept_with_source(
        &self,
        request: &AssetRequest,
    ) -> ProxyResult<(StoredResponse, ResponseSource)> {
        let key = request.key();
        if let Some(response) = self.storage.match_any(&key).await? {
            debug!("Cache hit: {}", key);
            return Ok((response, ResponseSource::Cache));
        }

        debug!("Cache miss, forwarding to network: {}", key);
        let response = self.fetcher.fetch(request).await?;
        Ok((response, ResponseSource::Network))
    }
}
