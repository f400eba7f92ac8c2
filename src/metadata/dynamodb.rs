//! AWS DynamoDB metadata store backend.
//!
//! One item per upload with a PK/SK pattern:
//!   PK (`pk`) = record id (generated UUID)
//!   SK (`sk`) = the stored object's public URL
//!
//! Caller-supplied profile fields are flattened into the item as native
//! attributes: `Text` -> S, `Number` -> N, `Flag` -> BOOL.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use aws_smithy_types::error::display::DisplayErrorContext;
use tracing::{debug, info};

use super::store::{FieldValue, MetadataStore, UploadRecord};
use crate::config::MetadataConfig;
use crate::errors::StoreError;

/// Metadata store backed by a DynamoDB table.
pub struct DynamoDbMetadataStore {
    client: Client,
    table_name: String,
}

impl DynamoDbMetadataStore {
    /// Create a new DynamoDB metadata store from configuration.
    pub async fn new(config: &MetadataConfig) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let Some(ref endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let client = Client::new(&sdk_config);

        info!(
            "DynamoDB metadata store initialized: table={} region={}",
            config.table_name, config.region
        );

        Ok(Self {
            client,
            table_name: config.table_name.clone(),
        })
    }

    /// Classify an SDK error as transient or permanent.
    ///
    /// Throttling and server-side trouble are retryable; schema, auth and
    /// missing-table errors are permanent.
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
                    "ProvisionedThroughputExceededException"
                        | "ThrottlingException"
                        | "RequestLimitExceeded"
                        | "InternalServerError"
                        | "ServiceUnavailable"
                        | "LimitExceededException"
                        | "TransactionInProgressException"
                )
            ),
            _ => false,
        };

        let message = format!("DynamoDB {op}: {}", DisplayErrorContext(err));
        if retryable {
            StoreError::transient(message)
        } else {
            StoreError::permanent(message)
        }
    }
}

/// Convert a profile field value to a DynamoDB attribute.
fn field_to_attribute(value: &FieldValue) -> AttributeValue {
    match value {
        FieldValue::Text(s) => AttributeValue::S(s.clone()),
        FieldValue::Number(n) => AttributeValue::N(n.to_string()),
        FieldValue::Flag(b) => AttributeValue::Bool(*b),
    }
}

/// Convert a DynamoDB attribute back to a profile field value.
///
/// Attribute types outside the scalar subset are not produced by this
/// store and map to `None`.
fn attribute_to_field(value: &AttributeValue) -> Option<FieldValue> {
    match value {
        AttributeValue::S(s) => Some(FieldValue::Text(s.clone())),
        AttributeValue::N(n) => n.parse::<i64>().ok().map(FieldValue::Number),
        AttributeValue::Bool(b) => Some(FieldValue::Flag(*b)),
        _ => None,
    }
}

impl MetadataStore for DynamoDbMetadataStore {
    fn put_record(
        &self,
        record: UploadRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut item = HashMap::new();
            item.insert("pk".to_string(), AttributeValue::S(record.record_id));
            item.insert("sk".to_string(), AttributeValue::S(record.public_url));
            for (name, value) in &record.profile {
                // pk/sk are structural; a profile field may not shadow them.
                if name == "pk" || name == "sk" {
                    continue;
                }
                item.insert(name.clone(), field_to_attribute(value));
            }

            debug!("DynamoDB put_item: table={}", self.table_name);

            self.client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(item))
                .send()
                .await
                .map_err(|e| Self::classify("put_item", e))?;

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
            debug!(
                "DynamoDB query: table={} pk={}",
                self.table_name, record_id
            );

            // The sort key is the object URL, unknown to the caller, so
            // lookup is a single-key query rather than get_item.
            let result = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("pk = :pk")
                .expression_attribute_values(":pk", AttributeValue::S(record_id.clone()))
                .limit(1)
                .send()
                .await
                .map_err(|e| Self::classify("query", e))?;

            let Some(item) = result.items().first() else {
                return Ok(None);
            };

            let public_url = match item.get("sk") {
                Some(AttributeValue::S(url)) => url.clone(),
                _ => String::new(),
            };

            let mut profile = HashMap::new();
            for (name, value) in item {
                if name == "pk" || name == "sk" {
                    continue;
                }
                if let Some(field) = attribute_to_field(value) {
                    profile.insert(name.clone(), field);
                }
            }

            Ok(Some(UploadRecord {
                record_id,
                public_url,
                profile,
            }))
        })
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_to_attribute_scalars() {
        assert_eq!(
            field_to_attribute(&FieldValue::Text("Ada".into())),
            AttributeValue::S("Ada".into())
        );
        assert_eq!(
            field_to_attribute(&FieldValue::Number(42)),
            AttributeValue::N("42".into())
        );
        assert_eq!(
            field_to_attribute(&FieldValue::Flag(true)),
            AttributeValue::Bool(true)
        );
    }

    #[test]
    fn test_attribute_to_field_round_trip() {
        for value in [
            FieldValue::Text("x".into()),
            FieldValue::Number(-3),
            FieldValue::Flag(false),
        ] {
            let attr = field_to_attribute(&value);
            assert_eq!(attribute_to_field(&attr), Some(value));
        }
    }

    #[test]
    fn test_attribute_to_field_ignores_non_scalars() {
        let attr = AttributeValue::Ss(vec!["a".into(), "b".into()]);
        assert_eq!(attribute_to_field(&attr), None);
    }

    #[test]
    fn test_non_integer_number_is_dropped() {
        // The store only writes integer N values; a foreign item with a
        // float N attribute is skipped rather than mangled.
        let attr = AttributeValue::N("3.5".into());
        assert_eq!(attribute_to_field(&attr), None);
    }
}
