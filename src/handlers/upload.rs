//! Upload ingress handler.
//!
//! Decodes one multipart request into an [`UploadRequest`] and hands it
//! to the pipeline.  The file part must be named `file`; every other text
//! part becomes a caller-supplied profile field on the metadata record.
//! Multipart parsing itself is axum's concern -- this handler only maps
//! fields in and pipeline results out.

use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics::counter;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

use crate::errors::ApiError;
use crate::metadata::store::FieldValue;
use crate::metrics::BYTES_RECEIVED_TOTAL;
use crate::pipeline::UploadRequest;
use crate::AppState;

/// Multipart field name carrying the file.
const FILE_FIELD: &str = "file";

/// Success body for `POST /upload`.
///
/// The field name is part of the public contract consumed by existing
/// clients.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    /// Public URL of the stored object.
    #[serde(rename = "profile_imageUrl")]
    pub profile_image_url: String,
}

/// `POST /upload` -- store one file and register its metadata record.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "Upload",
    operation_id = "Upload",
    request_body(content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored and registered", body = UploadResponse),
        (status = 400, description = "No file part, or invalid input"),
        (status = 500, description = "Object storage or metadata registration failed")
    )
)]
pub async fn upload(state: Arc<AppState>, mut multipart: Multipart) -> Result<Response, ApiError> {
    let mut file: Option<(bytes::Bytes, String, String)> = None;
    let mut profile: HashMap<String, FieldValue> = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::MalformedUpload {
            message: e.to_string(),
        })?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == FILE_FIELD {
            let filename = field.file_name().unwrap_or_default().to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field.bytes().await.map_err(|e| ApiError::MalformedUpload {
                message: e.to_string(),
            })?;
            file = Some((data, filename, content_type));
        } else if !name.is_empty() {
            // Remaining text parts become profile fields on the record.
            let value = field.text().await.map_err(|e| ApiError::MalformedUpload {
                message: e.to_string(),
            })?;
            profile.insert(name, FieldValue::Text(value));
        }
    }

    let Some((payload, filename, content_type)) = file else {
        return Err(ApiError::MissingFile);
    };

    counter!(BYTES_RECEIVED_TOTAL).increment(payload.len() as u64);
    debug!(
        "upload received: filename={} content_type={} bytes={} profile_fields={}",
        filename,
        content_type,
        payload.len(),
        profile.len()
    );

    let request = UploadRequest {
        payload,
        filename,
        content_type,
        profile,
    };

    let committed = state.pipeline.execute(request).await.map_err(|err| {
        // The orphaned key goes to logs/telemetry, never the HTTP body.
        if let Some(orphan) = err.orphaned_object_key() {
            error!(
                "upload failed ({}): orphaned object key={}",
                err.kind(),
                orphan
            );
        } else {
            error!("upload failed ({}): {}", err.kind(), err);
        }
        ApiError::Upload(err)
    })?;

    let body = UploadResponse {
        profile_image_url: committed.public_url,
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}
