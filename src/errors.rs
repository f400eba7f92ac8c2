//! Error taxonomy for the upload relay.
//!
//! Store clients classify every failure as transient (retryable) or
//! permanent before it crosses into the pipeline, and the pipeline wraps
//! terminal failures with the phase that produced them.  The HTTP layer
//! only ever sees [`ApiError`], which implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(ApiError::MissingFile)`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

// -- Store-level errors -------------------------------------------------------

/// A failure reported by an object or metadata store client.
///
/// The classification drives the pipeline's retry policy: transient
/// failures are retried with backoff, permanent failures abort the phase
/// immediately.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network trouble, throttling, timeouts -- safe to retry.
    #[error("{message}")]
    Transient { message: String },

    /// Auth, config, invalid bucket/table -- retrying cannot help.
    #[error("{message}")]
    Permanent { message: String },
}

impl StoreError {
    /// Construct a transient (retryable) store error.
    pub fn transient(message: impl Into<String>) -> Self {
        StoreError::Transient {
            message: message.into(),
        }
    }

    /// Construct a permanent (non-retryable) store error.
    pub fn permanent(message: impl Into<String>) -> Self {
        StoreError::Permanent {
            message: message.into(),
        }
    }

    /// Whether the pipeline may retry the failed call.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }
}

// -- Pipeline-level errors ----------------------------------------------------

/// Terminal outcome of a failed pipeline execution.
///
/// Exactly one variant per terminal state of the upload state machine:
/// validation rejected the request, the object write failed, or the
/// metadata write failed after the object was already durably stored.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Bad input; no store interaction was attempted.
    #[error("invalid upload: {0}")]
    Validation(String),

    /// Phase 1 (object write) failed terminally. No metadata was written.
    #[error("object storage failed: {source}")]
    Storage {
        #[source]
        source: StoreError,
    },

    /// Phase 2 (metadata write) failed terminally after a successful
    /// object write. The object at `orphaned_object_key` is durably
    /// stored but unreferenced -- callers and ops tooling use the key
    /// to reconcile or delete it. The key is deliberately absent from
    /// the display string, which becomes an HTTP error body; it reaches
    /// logs and telemetry through [`UploadError::orphaned_object_key`].
    #[error("metadata registration failed: {source}")]
    Metadata {
        #[source]
        source: StoreError,
        orphaned_object_key: String,
    },
}

impl UploadError {
    /// Stable failure-kind label, used for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::Validation(_) => "ValidationError",
            UploadError::Storage { .. } => "StorageFailure",
            UploadError::Metadata { .. } => "MetadataFailure",
        }
    }

    /// The key of an orphaned object, when phase 2 failed.
    pub fn orphaned_object_key(&self) -> Option<&str> {
        match self {
            UploadError::Metadata {
                orphaned_object_key,
                ..
            } => Some(orphaned_object_key),
            _ => None,
        }
    }
}

// -- HTTP-level errors --------------------------------------------------------

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The multipart body did not contain a `file` part.
    #[error("No file uploaded.")]
    MissingFile,

    /// The multipart body could not be decoded.
    #[error("{message}")]
    MalformedUpload { message: String },

    /// The pipeline reported a terminal failure.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// The requested metadata record does not exist.
    #[error("record not found: {record_id}")]
    RecordNotFound { record_id: String },

    /// Catch-all for unexpected internal errors.
    #[error("We encountered an internal error, please try again.")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingFile => StatusCode::BAD_REQUEST,
            ApiError::MalformedUpload { .. } => StatusCode::BAD_REQUEST,
            ApiError::Upload(UploadError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Upload(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::RecordNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();
        let date = httpdate::fmt_http_date(std::time::SystemTime::now());

        // The error body is the human-readable cause as plain text.
        (
            status,
            [
                ("content-type", "text/plain; charset=utf-8".to_string()),
                ("x-request-id", request_id),
                ("date", date),
                ("server", "Dropgate".to_string()),
            ],
            self.to_string(),
        )
            .into_response()
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, id.to_uppercase());
    }

    #[test]
    fn test_store_error_classification() {
        assert!(StoreError::transient("slow down").is_transient());
        assert!(!StoreError::permanent("no such bucket").is_transient());
    }

    #[test]
    fn test_upload_error_kinds() {
        let v = UploadError::Validation("empty payload".into());
        assert_eq!(v.kind(), "ValidationError");
        assert!(v.orphaned_object_key().is_none());

        let s = UploadError::Storage {
            source: StoreError::permanent("denied"),
        };
        assert_eq!(s.kind(), "StorageFailure");
        assert!(s.orphaned_object_key().is_none());

        let m = UploadError::Metadata {
            source: StoreError::transient("throttled"),
            orphaned_object_key: "123-photo.png".to_string(),
        };
        assert_eq!(m.kind(), "MetadataFailure");
        assert_eq!(m.orphaned_object_key(), Some("123-photo.png"));
    }

    #[test]
    fn test_metadata_error_display_omits_orphaned_key() {
        // The display string becomes a 500 body; the orphaned key is
        // reserved for logs and telemetry via the accessor.
        let err = UploadError::Metadata {
            source: StoreError::transient("throttled"),
            orphaned_object_key: "123-photo.png".to_string(),
        };
        assert!(!err.to_string().contains("123-photo.png"));
        assert_eq!(err.orphaned_object_key(), Some("123-photo.png"));
        assert!(!ApiError::Upload(err).to_string().contains("123-photo.png"));
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(ApiError::MissingFile.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Upload(UploadError::Validation("empty".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Upload(UploadError::Storage {
                source: StoreError::permanent("denied"),
            })
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::RecordNotFound {
                record_id: "abc".into()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_missing_file_message_matches_http_body() {
        // The 400 body for a missing file part is this exact string.
        assert_eq!(ApiError::MissingFile.to_string(), "No file uploaded.");
    }
}
