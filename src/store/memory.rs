//! In-memory [`ObjectStore`] used by tests (§8) so the pipeline and
//! retention sweep can be exercised with no network or cloud credentials.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{BackupError, Result};

use super::{ObjectInfo, ObjectStore};

struct Entry {
    data: Vec<u8>,
    last_modified: chrono::DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let mut objects = self.objects.lock().expect("memory store mutex poisoned");
        objects.insert(
            key.to_string(),
            Entry {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn put_chunked(&self, key: &str, data: Vec<u8>) -> Result<()> {
        // The in-memory fake has no real part-size limit to honour; chunking
        // would just be bookkeeping with no observable effect.
        self.put(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let objects = self.objects.lock().expect("memory store mutex poisoned");
        objects
            .get(key)
            .map(|e| e.data.clone())
            .ok_or_else(|| BackupError::not_found(format!("object {key}")))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let objects = self.objects.lock().expect("memory store mutex poisoned");
        Ok(objects.contains_key(key))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        let objects = self.objects.lock().expect("memory store mutex poisoned");
        Ok(objects.get(key).map(|e| ObjectInfo {
            key: key.to_string(),
            size: e.data.len() as u64,
            last_modified: e.last_modified,
        }))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut objects = self.objects.lock().expect("memory store mutex poisoned");
        Ok(objects.remove(key).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let objects = self.objects.lock().expect("memory store mutex poisoned");
        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, e)| ObjectInfo {
                key: key.clone(),
                size: e.data.len() as u64,
                last_modified: e.last_modified,
            })
            .collect())
    }

    async fn test_connection(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryStore::new();
        store.put("a/b", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn get_missing_key_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("missing").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.put("a", vec![1]).await.unwrap();
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryStore::new();
        store.put("dev/2026/01/a", vec![1]).await.unwrap();
        store.put("dev/2026/01/b", vec![1, 2]).await.unwrap();
        store.put("other/x", vec![1]).await.unwrap();

        let listed = store.list("dev/2026/01/").await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn prune_deletes_only_older_than_cutoff() {
        let store = MemoryStore::new();
        store.put("dev/old", vec![1]).await.unwrap();
        {
            let mut objects = store.objects.lock().unwrap();
            objects.get_mut("dev/old").unwrap().last_modified = Utc::now() - chrono::Duration::days(100);
        }
        store.put("dev/new", vec![1]).await.unwrap();

        let removed = store.prune("dev/", 30).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!store.exists("dev/old").await.unwrap());
        assert!(store.exists("dev/new").await.unwrap());
    }
}
