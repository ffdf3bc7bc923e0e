//! Error types for the offline asset proxy

use thiserror::Error;

use crate::cache::CacheError;
use crate::dispatch::ProxyState;
use crate::network::FetchError;

/// Result type alias for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Errors surfaced by install, intercept and the host runtime
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A manifest asset could not be fetched; nothing from this attempt was stored
    #[error("Install failed: could not cache '{asset}': {reason}")]
    InstallFailed { asset: String, reason: String },

    /// No cache hit and the network forward failed
    #[error(transparent)]
    NetworkFetchFailed(#[from] FetchError),

    /// The cache store rejected a read or write
    #[error("Cache storage error: {0}")]
    Storage(#[from] CacheError),

    /// A fetch event arrived while the proxy was not active
    #[error("Proxy is not active (state: {0})")]
    NotActive(ProxyState),

    /// The runtime has no handler registered for an event
    #[error("No handler registered for '{0}' events")]
    NoHandler(&'static str),
}

impl ProxyError {
    /// Whether this error came from a failed install
    pub fn is_install_failure(&self) -> bool {
        matches!(self, ProxyError::InstallFailed { .. })
    }

    /// Whether this error is a network failure passed through from a fetch
    pub fn is_network_failure(&self) -> bool {
        matches!(self, ProxyError::NetworkFetchFailed(_))
    }
}
