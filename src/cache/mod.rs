//! Cache storage for the offline asset proxy
//!
//! A cache storage holds any number of named generations, each a keyed store
//! of request key to response. The proxy only ever holds a generation name;
//! the storage owns the data and its consistency. Lookups through
//! `match_any` search every generation in creation order, not just the one the
//! proxy opened.

mod disk;
mod memory;

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

use async_trait::async_trait;
use thiserror::Error;

use crate::request::{RequestKey, StoredResponse};

/// Errors raised by a cache storage
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the backing files failed
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored entry or index could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A write targeted a generation that was never opened
    #[error("Unknown cache generation: {0}")]
    UnknownGeneration(String),

    /// No cache directory could be determined for this platform
    #[error("Could not determine a cache directory")]
    NoCacheDir,
}

/// A host-managed store of named cache generations
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens the named generation, creating it if absent
    async fn open(&self, name: &str) -> Result<(), CacheError>;

    /// Whether the named generation exists
    async fn has(&self, name: &str) -> Result<bool, CacheError>;

    /// Names of all generations in creation order
    async fn generations(&self) -> Result<Vec<String>, CacheError>;

    /// Stores a batch of entries into a generation, overwriting existing keys
    ///
    /// Either every entry of the batch is written or, on error, none of the
    /// new entries become visible.
    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, StoredResponse)>,
    ) -> Result<(), CacheError>;

    /// Looks the key up in every generation, first match in creation order wins
    async fn match_any(&self, key: &RequestKey) -> Result<Option<StoredResponse>, CacheError>;

    /// Keys stored in a generation, sorted
    async fn keys(&self, name: &str) -> Result<Vec<RequestKey>, CacheError>;
}
