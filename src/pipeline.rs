//! The two-phase upload pipeline.
//!
//! Orchestrates the object write and the metadata write as one logical
//! transaction with explicit failure semantics, since the underlying
//! stores offer no cross-store atomicity:
//!
//!   Validating -> StoringObject -> { Aborted(StorageFailure)
//!                                  | RegisteringMetadata -> { Aborted(MetadataFailure, orphan)
//!                                                           | Committed } }
//!
//! The metadata write never begins before the object write is
//! acknowledged, so a record can never dangle.  The reverse hole -- an
//! object stored durably whose metadata write then fails terminally -- is
//! a known, accepted inconsistency window: the pipeline reports it
//! explicitly with the orphaned object key so ops tooling can reconcile
//! or delete the orphan, and never swallows it.
//!
//! Each pipeline execution is an independent unit of work; there is no
//! shared mutable state between concurrent executions other than the
//! process-monotonic key clock.

use bytes::Bytes;
use chrono::Utc;
use metrics::counter;
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RetryConfig;
use crate::errors::{StoreError, UploadError};
use crate::metadata::store::{FieldValue, MetadataStore, UploadRecord};
use crate::metrics::{ORPHANED_OBJECTS_TOTAL, UPLOADS_TOTAL, UPLOAD_FAILURES_TOTAL};
use crate::object_store::store::{ObjectRef, ObjectStore};

// -- Request / result types ---------------------------------------------------

/// One inbound upload, decoded by the ingress handler.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Raw file bytes.
    pub payload: Bytes,
    /// Original filename as declared by the client.
    pub filename: String,
    /// Declared MIME content type.
    pub content_type: String,
    /// Caller-supplied profile fields, copied verbatim into the record.
    pub profile: HashMap<String, FieldValue>,
}

/// Successful terminal state of one pipeline execution.
#[derive(Debug, Clone)]
pub struct Committed {
    /// Public URL of the stored object.
    pub public_url: String,
    /// Primary key of the metadata record.
    pub record_id: String,
    /// Key the object was stored under.
    pub object_key: String,
}

/// Retry policy applied independently to each phase.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per phase before surfacing failure.
    pub max_attempts: u32,
    /// Base backoff delay, doubled per attempt and jittered.
    pub base_delay: Duration,
    /// Ceiling on the total time spent in one phase; expiry behaves as
    /// transient-retry exhaustion.
    pub phase_deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            phase_deadline: Duration::from_secs(5),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            phase_deadline: Duration::from_millis(config.phase_deadline_ms),
        }
    }
}

// -- Object key generation ----------------------------------------------------

/// Last issued key timestamp, in milliseconds.
static KEY_CLOCK: AtomicI64 = AtomicI64::new(0);

/// Millisecond timestamp that is strictly increasing within the process,
/// so concurrent uploads of the same filename can never collide even
/// under a coarse or stepping clock.
fn next_key_timestamp() -> i64 {
    let now = Utc::now().timestamp_millis();
    let prev = KEY_CLOCK
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
            Some(prev.max(now - 1) + 1)
        })
        .unwrap_or(now - 1);
    prev.max(now - 1) + 1
}

/// Reduce a client-supplied filename to a safe key suffix: ASCII
/// alphanumerics, `.`, `-` and `_` pass through, everything else becomes
/// `-`. Leading/trailing separators are stripped and the result is capped
/// at 128 bytes.
fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();

    let mut out = cleaned
        .trim_matches(|c: char| c == '-' || c == '.')
        .to_string();
    out.truncate(128);
    if out.is_empty() {
        out = "upload".to_string();
    }
    out
}

/// Build the object key for one upload: `<timestamp>-<sanitized-filename>`.
fn generate_object_key(filename: &str) -> String {
    format!("{}-{}", next_key_timestamp(), sanitize_filename(filename))
}

// -- Pipeline -----------------------------------------------------------------

/// Orchestrates object storage and metadata registration for one upload.
pub struct UploadPipeline {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    retry: RetryPolicy,
}

impl UploadPipeline {
    /// Create a pipeline over the given store clients.
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            objects,
            metadata,
            retry,
        }
    }

    /// Run one upload through both phases.
    ///
    /// Either both writes land, or the caller is told exactly which phase
    /// failed; a partially populated success is never returned.
    pub async fn execute(&self, request: UploadRequest) -> Result<Committed, UploadError> {
        let result = self.execute_inner(request).await;
        match &result {
            Ok(committed) => {
                counter!(UPLOADS_TOTAL, "outcome" => "committed").increment(1);
                debug!(
                    "upload committed: key={} record={}",
                    committed.object_key, committed.record_id
                );
            }
            Err(err) => {
                counter!(UPLOADS_TOTAL, "outcome" => "failed").increment(1);
                counter!(UPLOAD_FAILURES_TOTAL, "kind" => err.kind()).increment(1);
            }
        }
        result
    }

    async fn execute_inner(&self, request: UploadRequest) -> Result<Committed, UploadError> {
        // Validating: bad input never reaches a store.
        validate(&request)?;

        let object_key = generate_object_key(&request.filename);

        // StoringObject (phase 1).
        let object_ref: ObjectRef = self
            .run_phase("object", || {
                self.objects
                    .put(&object_key, request.payload.clone(), &request.content_type)
            })
            .await
            .map_err(|source| UploadError::Storage { source })?;

        // RegisteringMetadata (phase 2). The record id is independent of
        // the object key.
        let record_id = Uuid::new_v4().to_string();
        let record = UploadRecord {
            record_id: record_id.clone(),
            public_url: object_ref.public_url.clone(),
            profile: request.profile.clone(),
        };

        if let Err(source) = self
            .run_phase("metadata", || self.metadata.put_record(record.clone()))
            .await
        {
            counter!(ORPHANED_OBJECTS_TOTAL).increment(1);
            warn!(
                "metadata registration failed, object orphaned: key={} url={} cause={}",
                object_key, object_ref.public_url, source
            );
            return Err(UploadError::Metadata {
                source,
                orphaned_object_key: object_key,
            });
        }

        // Committed.
        Ok(Committed {
            public_url: object_ref.public_url,
            record_id,
            object_key,
        })
    }

    /// Run one phase under the retry policy: transient failures are
    /// retried with jittered exponential backoff up to `max_attempts`;
    /// permanent failures abort immediately; the phase deadline bounds
    /// total time and expiry counts as transient exhaustion.
    async fn run_phase<T, F, Fut>(&self, phase: &'static str, op: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = async {
            let mut attempt = 1u32;
            loop {
                match op().await {
                    Ok(value) => return Ok(value),
                    Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                        let delay = self.backoff_delay(attempt);
                        warn!(
                            "{phase} phase attempt {attempt}/{} failed ({err}), retrying in {delay:?}",
                            self.retry.max_attempts
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        match timeout(self.retry.phase_deadline, attempts).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::transient(format!(
                "{phase} phase deadline of {:?} exceeded",
                self.retry.phase_deadline
            ))),
        }
    }

    /// Backoff before retry `attempt + 1`: `base * 2^(attempt-1)` plus
    /// jitter up to half the base delay.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.retry.base_delay.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << (attempt - 1).min(16));
        let jitter = if base == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=base / 2)
        };
        Duration::from_millis(exp.saturating_add(jitter))
    }
}

/// Reject uploads that could never be stored meaningfully.
fn validate(request: &UploadRequest) -> Result<(), UploadError> {
    if request.payload.is_empty() {
        return Err(UploadError::Validation("payload must not be empty".into()));
    }
    if request.filename.is_empty() {
        return Err(UploadError::Validation("filename must not be empty".into()));
    }
    if request.content_type.is_empty() {
        return Err(UploadError::Validation(
            "content type must not be empty".into(),
        ));
    }
    Ok(())
}

// -- Tests --------------------------------------------------------------------
