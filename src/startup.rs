use crate::config::{Config, TableNames};
use crate::errors::AppError;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::{
    error::SdkError as DynamoSdkError,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
    Client as DynamoDbClient,
};
use aws_sdk_s3::{
    error::SdkError as S3SdkError,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client,
};
use backoff::ExponentialBackoff;
use std::time::Duration;
use tracing;

/// Base AWS SDK configuration: region from config, optional LocalStack endpoint,
/// default credential provider chain.
pub async fn create_sdk_config(config: &Config) -> SdkConfig {
    tracing::info!(sdk_region = %config.aws_region, "Setting SDK region");
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.aws_region.clone()));

    if let Some(endpoint_url) = &config.localstack_endpoint {
        tracing::info!("Using localstack endpoint override: {}", endpoint_url);
        loader = loader.endpoint_url(endpoint_url);
    }
    loader.load().await
}

pub fn create_dynamodb_client(sdk_config: &SdkConfig) -> DynamoDbClient {
    DynamoDbClient::new(sdk_config)
}

// Path-style addressing keeps LocalStack happy.
pub fn create_s3_client(sdk_config: &SdkConfig) -> S3Client {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
        .force_path_style(true)
        .build();
    S3Client::from_conf(s3_config)
}

struct TableSpec<'a> {
    name: &'a str,
    hash_key: &'static str,
    range_key: Option<&'static str>,
}

fn table_specs(tables: &TableNames) -> [TableSpec<'_>; 3] {
    [
        TableSpec { name: &tables.users, hash_key: "id", range_key: None },
        TableSpec { name: &tables.questions, hash_key: "user_id", range_key: Some("timestamp") },
        TableSpec { name: &tables.payments, hash_key: "payment_id", range_key: None },
    ]
}

fn build_err(what: &str, e: impl std::fmt::Display) -> AppError {
    AppError::InitError(format!("Failed to build {}: {}", what, e))
}

/// Creates the DynamoDB table if it doesn't exist.
async fn create_table_if_not_exists(client: &DynamoDbClient, spec: &TableSpec<'_>) -> Result<(), backoff::Error<AppError>> {
    let mut request = client
        .create_table()
        .table_name(spec.name)
        .billing_mode(BillingMode::PayPerRequest);

    let keys = std::iter::once((spec.hash_key, KeyType::Hash))
        .chain(spec.range_key.map(|k| (k, KeyType::Range)));
    for (attribute, key_type) in keys {
        request = request
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(attribute)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(|e| backoff::Error::permanent(build_err("attribute definition", e)))?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(attribute)
                    .key_type(key_type)
                    .build()
                    .map_err(|e| backoff::Error::permanent(build_err("key schema", e)))?,
            );
    }

    match request.send().await {
        Ok(_) => {
            tracing::info!("Startup: Table '{}' created successfully or setup initiated.", spec.name);
            Ok(())
        }
        Err(DynamoSdkError::ServiceError(service_err)) => {
            if service_err.err().is_resource_in_use_exception() {
                tracing::info!("Startup: Table '{}' already exists, no action needed.", spec.name);
                Ok(())
            } else {
                let context = format!("Startup: Service error creating DynamoDB table '{}'", spec.name);
                tracing::error!("{}: {:?}", context, service_err);
                Err(backoff::Error::permanent(AppError::InitError(format!("{}: {:?}", context, service_err.err()))))
            }
        }
        Err(e) => {
            // Dispatch/timeout failures: the endpoint may still be starting up.
            tracing::warn!("Startup: SDK error creating DynamoDB table '{}', will retry: {}", spec.name, e);
            Err(backoff::Error::transient(AppError::InitError(format!(
                "Startup: SDK error creating DynamoDB table '{}': {}",
                spec.name, e
            ))))
        }
    }
}

/// Ensures the S3 bucket exists, creating it with the correct location constraint if needed.
async fn ensure_s3_bucket_exists(client: &S3Client, bucket_name: &str, region_str: &str) -> Result<(), backoff::Error<AppError>> {
    let mut request = client.create_bucket().bucket(bucket_name);
    if region_str != "us-east-1" {
        request = request.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region_str))
                .build(),
        );
    }

    match request.send().await {
        Ok(_) => {
            tracing::info!("Startup: S3 bucket '{}' created.", bucket_name);
            Ok(())
        }
        Err(S3SdkError::ServiceError(service_err)) => {
            let code = service_err.err().meta().code();
            if code == Some("BucketAlreadyOwnedByYou") || code == Some("BucketAlreadyExists") {
                tracing::info!("Startup: S3 bucket '{}' already exists.", bucket_name);
                Ok(())
            } else {
                let context = format!("Startup: Service error creating S3 bucket '{}'", bucket_name);
                tracing::error!("{}: {:?}", context, service_err);
                Err(backoff::Error::permanent(AppError::InitError(format!("{}: {:?}", context, service_err.err()))))
            }
        }
        Err(e) => {
            tracing::warn!("Startup: SDK error creating S3 bucket '{}', will retry: {}", bucket_name, e);
            Err(backoff::Error::transient(AppError::InitError(format!(
                "Startup: SDK error creating S3 bucket '{}': {}",
                bucket_name, e
            ))))
        }
    }
}

fn startup_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(250),
        max_elapsed_time: Some(Duration::from_secs(30)),
        ..ExponentialBackoff::default()
    }
}

/// Initializes required AWS resources (DynamoDB tables, optional S3 bucket).
/// Transient SDK errors are retried with exponential backoff.
pub async fn init_resources(
    db_client: &DynamoDbClient,
    s3_client: Option<&S3Client>,
    config: &Config,
) -> Result<(), AppError> {
    tracing::info!("Startup: Initializing AWS resources...");
    for spec in table_specs(&config.tables) {
        backoff::future::retry(startup_backoff(), || create_table_if_not_exists(db_client, &spec)).await?;
    }
    if let (Some(client), Some(bucket)) = (s3_client, config.meme_bucket_name.as_deref()) {
        backoff::future::retry(startup_backoff(), || ensure_s3_bucket_exists(client, bucket, &config.aws_region))
            .await?;
    }
    tracing::info!("Startup: AWS resource initialization complete.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn questions_table_is_keyed_by_user_and_time() {
        let tables = TableNames {
            users: "u".into(),
            questions: "q".into(),
            payments: "p".into(),
        };
        let specs = table_specs(&tables);
        assert_eq!((specs[0].name, specs[0].hash_key, specs[0].range_key), ("u", "id", None));
        assert_eq!(
            (specs[1].name, specs[1].hash_key, specs[1].range_key),
            ("q", "user_id", Some("timestamp"))
        );
        assert_eq!((specs[2].name, specs[2].hash_key), ("p", "payment_id"));
    }
}
