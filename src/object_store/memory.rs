//! In-memory object store backend.
//!
//! Holds objects in a `RwLock<HashMap>`; intended for local development
//! and tests.  Public URLs use a synthetic domain that keeps the same
//! `https://{bucket}.{domain}/{key}` shape as the S3 backend.

use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use super::store::{ObjectRef, ObjectStore, StoredObject};
use crate::errors::StoreError;

const URL_PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Object store held entirely in process memory.
pub struct MemoryObjectStore {
    bucket: String,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    /// Create an empty in-memory store for `bucket`.
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored objects (test helper).
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectRef, StoreError>> + Send + '_>> {
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            let public_url = self.public_url(&key);
            self.objects
                .write()
                .map_err(|_| StoreError::permanent("memory store lock poisoned"))?
                .insert(
                    key.clone(),
                    StoredObject {
                        data,
                        content_type,
                    },
                );

            Ok(ObjectRef {
                bucket: self.bucket.clone(),
                key,
                public_url,
            })
        })
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<StoredObject>, StoreError>> + Send + '_>>
    {
        let key = key.to_string();
        Box::pin(async move {
            let objects = self
                .objects
                .read()
                .map_err(|_| StoreError::permanent("memory store lock poisoned"))?;
            Ok(objects.get(&key).cloned())
        })
    }

    fn delete(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            self.objects
                .write()
                .map_err(|_| StoreError::permanent("memory store lock poisoned"))?
                .remove(&key);
            Ok(())
        })
    }

    fn public_url(&self, key: &str) -> String {
        let encoded = utf8_percent_encode(key, URL_PATH_SET);
        format!("https://{}.objects.localhost/{}", self.bucket, encoded)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let store = MemoryObjectStore::new("test-bucket");
        let data = Bytes::from_static(b"hello world!");

        let obj_ref = store
            .put("1-hello.txt", data.clone(), "text/plain")
            .await
            .unwrap();
        assert_eq!(obj_ref.bucket, "test-bucket");
        assert_eq!(obj_ref.key, "1-hello.txt");
        assert_eq!(
            obj_ref.public_url,
            "https://test-bucket.objects.localhost/1-hello.txt"
        );

        let stored = store.get("1-hello.txt").await.unwrap().unwrap();
        assert_eq!(stored.data, data);
        assert_eq!(stored.content_type, "text/plain");
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = MemoryObjectStore::new("test-bucket");
        assert!(store.get("no-such-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryObjectStore::new("test-bucket");
        store
            .put("k", Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap();

        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        // Second delete of the same key still succeeds.
        store.delete("k").await.unwrap();
        assert!(store.is_empty());
    }
}
