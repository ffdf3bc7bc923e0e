//! Disk-backed cache storage
//!
//! Persists generations under an XDG-compliant cache directory
//! (`~/.cache/carrera/` on Linux) so entries written by one run are served by
//! the next. Layout:
//!
//! ```text
//! <root>/generations.json          names in creation order
//! <root>/<hash(name)>/<hash(key)>.json
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::{CacheError, CacheStorage};
use crate::request::{RequestKey, StoredResponse};

/// File listing generation names in creation order
const INDEX_FILE: &str = "generations.json";

/// Suffix for entry files that are written but not yet committed
const STAGING_SUFFIX: &str = "staged";

/// Suffix for the previous version of an entry while a batch is committed
const BACKUP_SUFFIX: &str = "backup";

/// Entry file contents
#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    key: RequestKey,
    response: StoredResponse,
}

/// Cache storage persisted as JSON files on disk
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    /// Directory holding the index and one directory per generation
    root: PathBuf,
    /// Serializes read-modify-write of the index file
    index_lock: Arc<Mutex<()>>,
    /// Serializes batch commits, which share staging file names per key
    batch_lock: Arc<Mutex<()>>,
}

/// One entry of a batch on its way into place
#[derive(Debug)]
struct StagedEntry {
    staging: PathBuf,
    target: PathBuf,
    /// Where the entry it replaces was moved, if there was one
    backup: Option<PathBuf>,
}

impl DiskCacheStorage {
    /// Creates a storage in the XDG-compliant cache directory
    ///
    /// Returns `Err(CacheError::NoCacheDir)` if the directory cannot be
    /// determined (e.g., no home directory).
    pub fn new() -> Result<Self, CacheError> {
        let project_dirs = ProjectDirs::from("", "", "carrera").ok_or(CacheError::NoCacheDir)?;
        Ok(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a storage rooted at a custom directory
    pub fn with_dir(root: PathBuf) -> Self {
        Self {
            root,
            index_lock: Arc::new(Mutex::new(())),
            batch_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Root directory of this storage
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn generation_dir(&self, name: &str) -> PathBuf {
        self.root.join(digest(name))
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> PathBuf {
        self.generation_dir(name).join(format!("{}.json", digest(key.as_str())))
    }

    async fn read_index(&self) -> Result<Vec<String>, CacheError> {
        match fs::read_to_string(self.index_path()).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_index(&self, names: &[String]) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(names)?;
        let staged = self.index_path().with_extension(STAGING_SUFFIX);
        fs::write(&staged, json).await?;
        fs::rename(&staged, self.index_path()).await?;
        Ok(())
    }

    async fn read_entry(&self, path: &Path) -> Result<Option<DiskEntry>, CacheError> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes every entry to a staged file
    ///
    /// On failure every staged file written so far is removed.
    async fn stage_entries(
        &self,
        name: &str,
        entries: Vec<(RequestKey, StoredResponse)>,
    ) -> Result<Vec<StagedEntry>, CacheError> {
        let mut staged: Vec<StagedEntry> = Vec::with_capacity(entries.len());
        for (key, response) in entries {
            let target = self.entry_path(name, &key);
            let staging = target.with_extension(STAGING_SUFFIX);
            let result = match serde_json::to_vec(&DiskEntry { key, response }) {
                Ok(json) => fs::write(&staging, json).await.map_err(CacheError::from),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                for entry in &staged {
                    let _ = fs::remove_file(&entry.staging).await;
                }
                let _ = fs::remove_file(&staging).await;
                return Err(e);
            }
            // A repeated key overwrote its staged file; last write wins.
            if staged.iter().any(|entry: &StagedEntry| entry.target == target) {
                continue;
            }
            staged.push(StagedEntry {
                staging,
                target,
                backup: None,
            });
        }
        Ok(staged)
    }

    /// Moves every staged entry into place
    ///
    /// Replaced files are kept aside until the whole batch is in place. If a
    /// move fails, the entries already moved are taken out again, the
    /// replaced files are restored and the remaining staged files removed.
    async fn commit_entries(&self, mut staged: Vec<StagedEntry>) -> Result<(), CacheError> {
        let mut failure = None;
        let mut committed = 0;
        for entry in staged.iter_mut() {
            if let Err(e) = commit_entry(entry).await {
                failure = Some(e);
                break;
            }
            committed += 1;
        }

        if let Some(e) = failure {
            for (i, entry) in staged.iter().enumerate() {
                if i < committed {
                    let _ = fs::remove_file(&entry.target).await;
                }
                if let Some(backup) = &entry.backup {
                    let _ = fs::rename(backup, &entry.target).await;
                }
                let _ = fs::remove_file(&entry.staging).await;
            }
            return Err(e.into());
        }

        for entry in &staged {
            if let Some(backup) = &entry.backup {
                let _ = fs::remove_file(backup).await;
            }
        }
        Ok(())
    }
}

/// Moves one staged entry into place, setting aside the file it replaces
async fn commit_entry(entry: &mut StagedEntry) -> std::io::Result<()> {
    let replaces_file = match fs::metadata(&entry.target).await {
        Ok(meta) => meta.is_file(),
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => return Err(e),
    };
    if replaces_file {
        let backup = entry.target.with_extension(BACKUP_SUFFIX);
        fs::rename(&entry.target, &backup).await?;
        entry.backup = Some(backup);
    }
    fs::rename(&entry.staging, &entry.target).await
}

/// Hex SHA-256 of a name, used for file and directory names
fn digest(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let _guard = self.index_lock.lock().await;
        fs::create_dir_all(self.generation_dir(name)).await?;

        let mut names = self.read_index().await?;
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
            self.write_index(&names).await?;
            debug!("Created cache generation {}", name);
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.read_index().await?.iter().any(|n| n == name))
    }

    async fn generations(&self) -> Result<Vec<String>, CacheError> {
        self.read_index().await
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, StoredResponse)>,
    ) -> Result<(), CacheError> {
        if !self.has(name).await? {
            return Err(CacheError::UnknownGeneration(name.to_string()));
        }
        fs::create_dir_all(self.generation_dir(name)).await?;

        let _guard = self.batch_lock.lock().await;
        let staged = self.stage_entries(name, entries).await?;
        let count = staged.len();
        self.commit_entries(staged).await?;
        debug!("Stored {} entries in {}", count, name);
        Ok(())
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<StoredResponse>, CacheError> {
        for name in self.read_index().await? {
            if let Some(entry) = self.read_entry(&self.entry_path(&name, key)).await? {
                return Ok(Some(entry.response));
            }
        }
        Ok(None)
    }

    async fn keys(&self, name: &str) -> Result<Vec<RequestKey>, CacheError> {
        if !self.has(name).await? {
            return Err(CacheError::UnknownGeneration(name.to_string()));
        }

        let mut keys = Vec::new();
        let mut dir = match fs::read_dir(self.generation_dir(name)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(entry) = self.read_entry(&path).await? {
                keys.push(entry.key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
