//! Configuration for the offline asset proxy
//!
//! Holds the cache generation name, the asset manifest that is pre-cached on
//! install, and the origin that relative asset paths resolve against.

use reqwest::Url;

/// Name of the cache generation created on install.
///
/// Bumping this string is the only way to move to a fresh generation; the old
/// one is left in place.
pub const CACHE_NAME: &str = "carrera-cache-v1";

/// Assets fetched and stored during install, in order
pub const ASSET_MANIFEST: [&str; 4] = [
    "index.html",
    "manifest.json",
    "icon-192.png",
    "icon-512.png",
];

/// Origin used when none is configured
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080/";

/// Configuration for an `OfflineProxy`
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Cache generation opened on install
    pub cache_name: String,
    /// Paths pre-cached on install
    pub manifest: Vec<String>,
    /// Base URL that relative request paths are resolved against
    pub origin: Url,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            cache_name: CACHE_NAME.to_string(),
            manifest: ASSET_MANIFEST.iter().map(|s| s.to_string()).collect(),
            origin: Url::parse(DEFAULT_ORIGIN).expect("DEFAULT_ORIGIN is an absolute URL"),
        }
    }
}

impl ProxyConfig {
    /// Replaces the origin
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = origin;
        self
    }

    /// Replaces the cache generation name
    pub fn with_cache_name(mut self, cache_name: impl Into<String>) -> Self {
        self.cache_name = cache_name.into();
        self
    }

    /// Replaces the asset manifest
    pub fn with_manifest<I, S>(mut self, manifest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manifest = manifest.into_iter().map(Into::into).collect();
        self
    }
}
