//! AWS S3 object store backend.
//!
//! Writes uploaded payloads to a real S3 bucket via `put_object`, with
//! the content type declared by the client and `Content-Disposition:
//! inline` so browsers render the object in place.
//!
//! Public URLs follow the virtual-hosted convention
//! `https://{bucket}.s3.amazonaws.com/{key}` unless a base override is
//! configured (custom domains, MinIO, LocalStack).
//!
//! Credentials come from the configuration when present, otherwise the
//! standard AWS credential chain (env vars, `~/.aws/credentials`, IAM
//! role, etc.).

use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;
use aws_smithy_types::error::display::DisplayErrorContext;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use super::store::{ObjectRef, ObjectStore, StoredObject};
use crate::config::StorageConfig;
use crate::errors::StoreError;

/// Characters percent-encoded in the key component of a public URL.
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

/// Object store backed by AWS S3.
pub struct S3ObjectStore {
    /// AWS S3 SDK client.
    client: Client,
    /// Target bucket name.
    bucket: String,
    /// Base of all public URLs (no trailing slash).
    public_base: String,
}

impl S3ObjectStore {
    /// Create a new S3 object store from configuration.
    ///
    /// Injects static credentials when configured, otherwise resolves
    /// them via the default AWS credential chain.
    pub async fn new(config: &StorageConfig) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let Some(ref endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        if let (Some(ref ak), Some(ref sk)) = (&config.access_key_id, &config.secret_access_key)
        {
            let creds = aws_sdk_s3::config::Credentials::new(
                ak,
                sk,
                None, // session_token
                None, // expiry
                "dropgate-config",
            );
            loader = loader.credentials_provider(creds);
        }

        let sdk_config = loader.load().await;
        let client = Client::new(&sdk_config);

        let public_base = config
            .public_base_url
            .clone()
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://{}.s3.amazonaws.com", config.bucket));

        info!(
            "S3 object store initialized: bucket={} region={}",
            config.bucket, config.region
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            public_base,
        })
    }

    /// Classify an SDK error as transient or permanent.
    ///
    /// Connection-level failures (dispatch, timeout, malformed response)
    /// and throttling-family service codes are retryable; everything else
    /// (auth, missing bucket, invalid request) is permanent.
    fn classify<E, R>(op: &str, err: SdkError<E, R>) -> StoreError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug + Send + Sync + 'static,
    {
        let retryable = match &err {
            SdkError::TimeoutError(_)
            | SdkError::DispatchFailure(_)
            | SdkError::ResponseError(_) => true,
            SdkError::ServiceError(_) => matches!(
                err.code(),
                Some(
                    "SlowDown"
                        | "RequestTimeout"
                        | "RequestLimitExceeded"
                        | "InternalError"
                        | "ServiceUnavailable"
                        | "Throttling"
                        | "ThrottlingException"
                )
            ),
            _ => false,
        };

        let message = format!("S3 {op}: {}", DisplayErrorContext(err));
        if retryable {
            StoreError::transient(message)
        } else {
            StoreError::permanent(message)
        }
    }
}

impl ObjectStore for S3ObjectStore {
    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectRef, StoreError>> + Send + '_>> {
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            debug!(
                "S3 put_object: bucket={} key={} bytes={}",
                self.bucket,
                key,
                data.len()
            );

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(aws_sdk_s3::primitives::ByteStream::from(data))
                .content_type(&content_type)
                .content_disposition("inline")
                .send()
                .await
                .map_err(|e| Self::classify("put_object", e))?;

            Ok(ObjectRef {
                bucket: self.bucket.clone(),
                key: key.clone(),
                public_url: ObjectStore::public_url(self, &key),
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
            debug!("S3 get_object: bucket={} key={}", self.bucket, key);

            let resp = match self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                        return Ok(None);
                    }
                    return Err(Self::classify("get_object", e));
                }
            };

            let content_type = resp
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();

            let body = resp
                .body
                .collect()
                .await
                .map_err(|e| StoreError::transient(format!("S3 get_object body: {e}")))?
                .into_bytes();

            Ok(Some(StoredObject {
                data: body,
                content_type,
            }))
        })
    }

    fn delete(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            debug!("S3 delete_object: bucket={} key={}", self.bucket, key);

            // S3 delete_object is idempotent -- no error for missing keys.
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| Self::classify("delete_object", e))?;

            Ok(())
        })
    }

    fn public_url(&self, key: &str) -> String {
        let encoded = utf8_percent_encode(key, URL_PATH_SET);
        format!("{}/{}", self.public_base, encoded)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // Constructing a full S3ObjectStore requires the async SDK loader, so
    // the URL formula is exercised directly.

    #[test]
    fn test_public_url_formula() {
        let base = "https://uploads-bucket.s3.amazonaws.com";
        let key = "1712000000000-photo.png";
        let encoded = utf8_percent_encode(key, URL_PATH_SET);
        assert_eq!(
            format!("{base}/{encoded}"),
            "https://uploads-bucket.s3.amazonaws.com/1712000000000-photo.png"
        );
    }

    #[test]
    fn test_public_url_encodes_reserved_chars() {
        let key = "123-my photo#1.png";
        let encoded = utf8_percent_encode(key, URL_PATH_SET).to_string();
        assert_eq!(encoded, "123-my%20photo%231.png");
    }

    #[test]
    fn test_public_base_trailing_slash_trimmed() {
        let base = "https://cdn.example.com/uploads/"
            .trim_end_matches('/')
            .to_string();
        assert_eq!(base, "https://cdn.example.com/uploads");
    }
}
