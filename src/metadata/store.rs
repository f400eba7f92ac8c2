//! Abstract metadata store trait.
//!
//! Any metadata backend must implement [`MetadataStore`].  The trait uses
//! manually desugared async methods (pinned futures) so it can be shared
//! between the DynamoDB client and the in-memory store behind
//! `Arc<dyn MetadataStore>`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::errors::StoreError;

/// A scalar value in a record's caller-supplied profile fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum FieldValue {
    /// String value.
    Text(String),
    /// Integer value.
    Number(i64),
    /// Boolean value.
    Flag(bool),
}

/// Metadata pointer row for one stored object.
///
/// `record_id` is a freshly generated identifier, independent of the
/// object key; `public_url` is the stored object's public URL and doubles
/// as the sort key in DynamoDB.  A record must never be written unless
/// the object behind `public_url` was durably committed first.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    /// Primary key: generated UUID, unique per upload.
    pub record_id: String,
    /// Sort key: the stored object's public URL.
    pub public_url: String,
    /// Caller-supplied profile fields.
    pub profile: HashMap<String, FieldValue>,
}

/// Async metadata store contract.
///
/// `put_record` has insert-or-overwrite semantics; the pipeline supplies
/// a fresh `record_id` per call and never intentionally overwrites.
pub trait MetadataStore: Send + Sync + 'static {
    /// Durably write `record`.
    fn put_record(
        &self,
        record: UploadRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Fetch a record by its primary key, or `None` if absent.
    fn get_record(
        &self,
        record_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UploadRecord>, StoreError>> + Send + '_>>;
}

// -- Tests -------------------------------------------------------------------
