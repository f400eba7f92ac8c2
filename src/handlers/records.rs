//! Metadata record lookup handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::ApiError;
use crate::metadata::store::FieldValue;
use crate::AppState;

/// Body for `GET /records/{id}`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RecordResponse {
    /// Primary key of the record.
    pub record_id: String,
    /// Public URL of the stored object the record points at.
    pub public_url: String,
    /// Caller-supplied profile fields.
    pub profile: HashMap<String, FieldValue>,
}

/// `GET /records/{id}` -- fetch the metadata record for one upload.
#[utoipa::path(
    get,
    path = "/records/{id}",
    tag = "Records",
    operation_id = "GetRecord",
    params(
        ("id" = String, Path, description = "Record id returned at upload time"),
    ),
    responses(
        (status = 200, description = "Record found", body = RecordResponse),
        (status = 404, description = "No such record"),
        (status = 500, description = "Metadata store failure")
    )
)]
pub async fn get_record(state: Arc<AppState>, record_id: &str) -> Result<Response, ApiError> {
    let record = state
        .metadata
        .get_record(record_id)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?
        .ok_or_else(|| ApiError::RecordNotFound {
            record_id: record_id.to_string(),
        })?;

    let body = RecordResponse {
        record_id: record.record_id,
        public_url: record.public_url,
        profile: record.profile,
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}
