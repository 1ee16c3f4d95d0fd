//! AWS SDK configuration
//!
//! Builds the DynamoDB client backing the principal store, supporting a
//! custom endpoint for DynamoDB Local or LocalStack.

use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::Client as DynamoDbSdkClient;

use crate::config::Settings;

/// AWS configuration builder
pub struct AwsConfigBuilder<'a> {
    settings: &'a Settings,
}

impl<'a> AwsConfigBuilder<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Build the base AWS SDK configuration
    ///
    /// The region comes from settings; credentials follow the default chain
    /// (env vars, profile, instance role).
    pub async fn build_sdk_config(&self) -> SdkConfig {
        let region_provider = RegionProviderChain::first_try(Region::new(self.settings.aws_region.clone()))
            .or_default_provider();

        aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await
    }

    /// Create a DynamoDB client, honouring `DYNAMODB_ENDPOINT_URL`
    pub async fn build_dynamodb_client(&self) -> DynamoDbSdkClient {
        let sdk_config = self.build_sdk_config().await;

        match &self.settings.dynamodb_endpoint_url {
            Some(endpoint_url) => {
                tracing::info!(endpoint = %endpoint_url, "Using custom DynamoDB endpoint");

                let dynamodb_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                    .endpoint_url(endpoint_url)
                    .build();

                DynamoDbSdkClient::from_conf(dynamodb_config)
            }
            None => DynamoDbSdkClient::new(&sdk_config),
        }
    }
}

/// Create a DynamoDB client from settings (convenience function)
pub async fn create_dynamodb_client(settings: &Settings) -> DynamoDbSdkClient {
    AwsConfigBuilder::new(settings).build_dynamodb_client().await
}
