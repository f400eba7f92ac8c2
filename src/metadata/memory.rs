//! In-memory metadata store backend.
//!
//! Holds records in a `RwLock<HashMap>` keyed by record id; intended for
//! local development and tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use super::store::{MetadataStore, UploadRecord};
use crate::errors::StoreError;

/// Metadata store held entirely in process memory.
#[derive(Default)]
pub struct MemoryMetadataStore {
    records: RwLock<HashMap<String, UploadRecord>>,
}

impl MemoryMetadataStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records (test helper).
    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records whose sort key equals `public_url` (test helper).
    pub fn records_for_url(&self, public_url: &str) -> Vec<UploadRecord> {
        self.records
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|r| r.public_url == public_url)
            .cloned()
            .collect()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn put_record(
        &self,
        record: UploadRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.records
                .write()
                .map_err(|_| StoreError::permanent("memory store lock poisoned"))?
                .insert(record.record_id.clone(), record);
            Ok(())
        })
    }

    fn get_record(
        &self,
        record_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UploadRecord>, StoreError>> + Send + '_>>
    {
        let record_id = record_id.to_string();
        Box::pin(async move {
            let records = self
                .records
                .read()
                .map_err(|_| StoreError::permanent("memory store lock poisoned"))?;
            Ok(records.get(&record_id).cloned())
        })
    }
}

// -- Tests -------------------------------------------------------------------
