//! carrera - offline asset proxy
//!
//! Pre-caches a fixed manifest of assets into a named cache generation and
//! answers later requests from the cache, forwarding misses to the network.

pub mod cache;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod network;
pub mod proxy;
pub mod request;

pub use cache::{CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use config::ProxyConfig;
pub use dispatch::{register, EventDispatch, LocalRuntime, ProxyState};
pub use error::{ProxyError, ProxyResult};
pub use network::{FetchError, Fetcher, HttpFetcher};
pub use proxy::{InstallReport, OfflineProxy};
pub use request::{AssetRequest, RequestKey, StoredResponse};
