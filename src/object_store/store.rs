//! Abstract object store trait.
//!
//! Every object storage backend must implement [`ObjectStore`].  The trait
//! works in terms of opaque byte payloads so callers do not need to know
//! the underlying medium.  Keys are always caller-provided: the pipeline
//! controls key uniqueness and can reconstruct the resulting public URL
//! deterministically.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

use crate::errors::StoreError;

/// Locator for a durably stored object.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    /// Bucket the object was written to.
    pub bucket: String,
    /// Object key within the bucket.
    pub key: String,
    /// Public URL at which the object is retrievable.
    pub public_url: String,
}

/// A stored object's data plus its declared content type.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Raw bytes of the object.
    pub data: Bytes,
    /// MIME content type recorded at put time.
    pub content_type: String,
}

/// Async object storage contract.
///
/// `put` is atomic at object granularity: no partial write is ever
/// externally visible.  All errors are classified as transient or
/// permanent before they leave the client.
pub trait ObjectStore: Send + Sync + 'static {
    /// Write `data` under `key` with the declared content type, returning
    /// a locator for the stored object.
    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectRef, StoreError>> + Send + '_>>;

    /// Read the full object at `key`, or `None` if it does not exist.
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<StoredObject>, StoreError>> + Send + '_>>;

    /// Delete the object at `key`. Idempotent: deleting a missing key is
    /// not an error.
    fn delete(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Derive the public URL for `key` from the bucket's public-access
    /// convention. Deterministic; performs no I/O.
    fn public_url(&self, key: &str) -> String;
}
