//! Axum router construction and route mapping.
//!
//! The [`app`] function wires every endpoint to its handler and returns a
//! ready-to-serve [`axum::Router`].

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, ApiError};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the Dropgate API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Dropgate Upload Relay API",
        version = "0.1.0",
        description = "Two-phase upload relay: object storage + metadata registration"
    ),
    paths(
        health_check,
        crate::handlers::upload::upload,
        crate::handlers::records::get_record,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Upload", description = "File upload"),
        (name = "Records", description = "Metadata record lookup"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let max_upload_size = state.config.server.max_upload_size;

    Router::new()
        // Liveness endpoint (not part of the upload API).
        .route("/health", get(health_check))
        // Prometheus metrics endpoint.
        .route("/metrics", get(metrics_handler))
        // OpenAPI spec.
        .route("/openapi.json", get(openapi_json))
        // The upload relay itself.
        .route("/upload", post(handle_upload))
        // Record lookup for reconciliation and clients.
        .route("/records/:id", get(handle_get_record))
        // Application state shared across all handlers.
        .with_state(state)
        // Common response headers (request id, date, server).
        .layer(middleware::from_fn(common_headers_middleware))
        // Metrics middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
        // The original relay served permissive CORS on every route.
        .layer(CorsLayer::permissive())
        // Bound multipart bodies at the configured upload cap.
        .layer(DefaultBodyLimit::max(max_upload_size))
}

// -- Common headers middleware -----------------------------------------------

/// Tower middleware that adds common response headers to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `Dropgate`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Only set x-request-id if not already present (the error path sets it).
    if !headers.contains_key("x-request-id") {
        let request_id = generate_request_id();
        headers.insert("x-request-id", HeaderValue::from_str(&request_id).unwrap());
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    headers.insert("date", HeaderValue::from_str(&date).unwrap());
    headers.insert("server", HeaderValue::from_static("Dropgate"));

    response
}

// -- Handlers -----------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// `GET /openapi.json` -- Serve the OpenAPI document.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// `POST /upload`
async fn handle_upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    crate::handlers::upload::upload(state, multipart).await
}

/// `GET /records/:id`
async fn handle_get_record(
    State(state): State<Arc<AppState>>,
    Path(record_id): Path<String>,
) -> Result<Response, ApiError> {
    crate::handlers::records::get_record(state, &record_id).await
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::metadata::memory::MemoryMetadataStore;
    use crate::metadata::store::MetadataStore;
    use crate::object_store::memory::MemoryObjectStore;
    use crate::object_store::store::ObjectStore;
    use crate::pipeline::{RetryPolicy, UploadPipeline};
    use axum::body::Body;
    use tower::ServiceExt;

    const BOUNDARY: &str = "dropgate-test-boundary";

    /// Memory-backed application state, with concrete store handles kept
    /// around so tests can inspect what the pipeline wrote.
    struct TestCtx {
        objects: Arc<MemoryObjectStore>,
        metadata: Arc<MemoryMetadataStore>,
        state: Arc<AppState>,
    }

    fn test_state() -> TestCtx {
        let config = Config::for_memory_backends();
        let objects = Arc::new(MemoryObjectStore::new(&config.storage.bucket));
        let metadata = Arc::new(MemoryMetadataStore::new());
        let objects_dyn: Arc<dyn ObjectStore> = objects.clone();
        let metadata_dyn: Arc<dyn MetadataStore> = metadata.clone();
        let pipeline = UploadPipeline::new(
            objects_dyn.clone(),
            metadata_dyn.clone(),
            RetryPolicy::from(&config.retry),
        );
        let state = Arc::new(AppState {
            config,
            objects: objects_dyn,
            metadata: metadata_dyn,
            pipeline,
        });
        TestCtx {
            objects,
            metadata,
            state,
        }
    }

    /// Build a multipart/form-data body with an optional file part and
    /// additional text fields.
    fn multipart_body(
        file: Option<(&str, &str, &[u8])>,
        fields: &[(&str, &str)],
    ) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some((filename, content_type, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
                     filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; \
                     name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> bytes::Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = app(test_state().state)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["server"], "Dropgate");
        let body = body_bytes(response).await;
        assert_eq!(&body[..], br#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let response = app(test_state().state)
            .oneshot(
                Request::builder()
                    .uri("/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_bytes(response).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["paths"]["/upload"].is_object());
        assert!(json["components"]["schemas"]["UploadResponse"].is_object());
        assert!(json["components"]["schemas"]["RecordResponse"].is_object());
    }

    #[tokio::test]
    async fn test_upload_end_to_end() {
        let ctx = test_state();
        let body = multipart_body(
            Some(("photo.png", "image/png", b"twelve bytes")),
            &[("full_name", "Ada Lovelace")],
        );

        let response = app(ctx.state.clone())
            .oneshot(upload_request(body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_bytes(response).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let url = json["profile_imageUrl"].as_str().unwrap();
        assert!(url.starts_with("https://dropgate-dev.objects.localhost/"));
        assert!(url.ends_with("-photo.png"));

        // Both phases landed: one object, one record pointing at the URL.
        assert_eq!(ctx.objects.len(), 1);
        let records = ctx.metadata.records_for_url(url);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].profile.get("full_name"),
            Some(&crate::metadata::store::FieldValue::Text(
                "Ada Lovelace".into()
            ))
        );
    }

    #[tokio::test]
    async fn test_upload_without_file_part_is_rejected() {
        let ctx = test_state();
        let body = multipart_body(None, &[("full_name", "Ada Lovelace")]);

        let response = app(ctx.state.clone())
            .oneshot(upload_request(body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_bytes(response).await;
        assert_eq!(&body[..], b"No file uploaded.");

        // The pipeline was never invoked.
        assert!(ctx.objects.is_empty());
        assert!(ctx.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_upload_with_empty_payload_is_client_error() {
        let ctx = test_state();
        let body = multipart_body(Some(("photo.png", "image/png", b"")), &[]);

        let response = app(ctx.state.clone())
            .oneshot(upload_request(body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(ctx.objects.is_empty());
    }

    #[tokio::test]
    async fn test_record_lookup_round_trip() {
        let ctx = test_state();
        let body = multipart_body(
            Some(("photo.png", "image/png", b"twelve bytes")),
            &[("designation", "Engineer")],
        );

        // Upload, then find the stored record id via the metadata store.
        let response = app(ctx.state.clone())
            .oneshot(upload_request(body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_bytes(response).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let url = json["profile_imageUrl"].as_str().unwrap();
        let record_id = ctx.metadata.records_for_url(url)[0].record_id.clone();

        let response = app(ctx.state.clone())
            .oneshot(
                Request::builder()
                    .uri(format!("/records/{record_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_bytes(response).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["record_id"].as_str().unwrap(), record_id);
        assert_eq!(json["public_url"].as_str().unwrap(), url);
        assert_eq!(json["profile"]["designation"].as_str().unwrap(), "Engineer");
    }

    #[tokio::test]
    async fn test_record_lookup_missing_is_404() {
        let response = app(test_state().state)
            .oneshot(
                Request::builder()
                    .uri("/records/no-such-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
