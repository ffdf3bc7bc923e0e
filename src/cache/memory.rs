//! In-process cache storage
//!
//! Keeps every generation in memory. Used by tests and by hosts that do not
//! need entries to outlive the process.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheError, CacheStorage};
use crate::request::{RequestKey, StoredResponse};

/// Cache storage held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    /// Generations in creation order
    generations: RwLock<Vec<(String, HashMap<RequestKey, StoredResponse>)>>,
}

impl MemoryCacheStorage {
    /// Creates an empty storage
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let mut generations = self.generations.write().await;
        if !generations.iter().any(|(n, _)| n == name) {
            generations.push((name.to_string(), HashMap::new()));
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        let generations = self.generations.read().await;
        Ok(generations.iter().any(|(n, _)| n == name))
    }

    async fn generations(&self) -> Result<Vec<String>, CacheError> {
        let generations = self.generations.read().await;
        Ok(generations.iter().map(|(n, _)| n.clone()).collect())
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, StoredResponse)>,
    ) -> Result<(), CacheError> {
        let mut generations = self.generations.write().await;
        let (_, store) = generations
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| CacheError::UnknownGeneration(name.to_string()))?;
        store.extend(entries);
        Ok(())
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<StoredResponse>, CacheError> {
        let generations = self.generations.read().await;
        Ok(generations
            .iter()
            .find_map(|(_, store)| store.get(key))
            .cloned())
    }

    async fn keys(&self, name: &str) -> Result<Vec<RequestKey>, CacheError> {
        let generations = self.generations.read().await;
        let (_, store) = generations
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| CacheError::UnknownGeneration(name.to_string()))?;
        let mut keys: Vec<RequestKey> = store.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{Method, Url};

    fn key(path: &str) -> RequestKey {
        let url = Url::parse("http://localhost:8080/").unwrap().join(path).unwrap();
        RequestKey::new(&Method::GET, &url)
    }

    #[tokio::test]
    async fn test_open_is_idempotent_and_keeps_order() {
        let storage = MemoryCacheStorage::new();
        storage.open("v1").await.unwrap();
        storage.open("v2").await.unwrap();
        storage.open("v1").await.unwrap();

        assert_eq!(storage.generations().await.unwrap(), vec!["v1", "v2"]);
        assert!(storage.has("v1").await.unwrap());
        assert!(!storage.has("v3").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_all_into_unknown_generation_fails() {
        let storage = MemoryCacheStorage::new();
        let result = storage
            .put_all("missing", vec![(key("a"), StoredResponse::new("a", 200, "a"))])
            .await;

        assert!(matches!(result, Err(CacheError::UnknownGeneration(_))));
    }

    #[tokio::test]
    async fn test_put_all_overwrites_existing_key() {
        let storage = MemoryCacheStorage::new();
        storage.open("v1").await.unwrap();
        storage
            .put_all("v1", vec![(key("a"), StoredResponse::new("a", 200, "first"))])
            .await
            .unwrap();
        storage
            .put_all("v1", vec![(key("a"), StoredResponse::new("a", 200, "second"))])
            .await
            .unwrap();

        assert_eq!(storage.keys("v1").await.unwrap().len(), 1);
        let hit = storage.match_any(&key("a")).await.unwrap().unwrap();
        assert_eq!(hit.body, b"second");
    }

    #[tokio::test]
    async fn test_match_any_searches_every_generation_in_order() {
        let storage = MemoryCacheStorage::new();
        storage.open("old").await.unwrap();
        storage.open("new").await.unwrap();
        storage
            .put_all("old", vec![(key("a"), StoredResponse::new("a", 200, "old"))])
            .await
            .unwrap();
        storage
            .put_all(
                "new",
                vec![
                    (key("a"), StoredResponse::new("a", 200, "new")),
                    (key("b"), StoredResponse::new("b", 200, "b")),
                ],
            )
            .await
            .unwrap();

        assert_eq!(storage.match_any(&key("a")).await.unwrap().unwrap().body, b"old");
        assert_eq!(storage.match_any(&key("b")).await.unwrap().unwrap().body, b"b");
        assert!(storage.match_any(&key("c")).await.unwrap().is_none());
    }
}
