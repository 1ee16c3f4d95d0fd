//! DynamoDB client wrapper
//!
//! This module provides a wrapper around the AWS DynamoDB SDK client
//! for principal lookups.

use aws_sdk_dynamodb::Client as DynamoDbSdkClient;
use std::sync::Arc;

use crate::config::Settings;

/// DynamoDB client wrapper for database operations.
#[derive(Clone)]
pub struct DynamoDbClient {
    settings: Arc<Settings>,
    client: DynamoDbSdkClient,
}

impl DynamoDbClient {
    pub fn new(settings: Arc<Settings>, client: DynamoDbSdkClient) -> Self {
        Self { settings, client }
    }

    /// Get a reference to the underlying AWS SDK client
    pub fn client(&self) -> &DynamoDbSdkClient {
        &self.client
    }

    /// Get the principals table name
    pub fn principals_table(&self) -> &str {
        &self.settings.dynamodb_principals_table
    }

    /// Verify the principals table is reachable
    ///
    /// `DescribeTable` fails both on connectivity problems and on a missing
    /// table, which are equally fatal for serving authenticated traffic.
    pub async fn health_check(&self) -> Result<(), aws_sdk_dynamodb::Error> {
        self.client
            .describe_table()
            .table_name(self.principals_table())
            .send()
            .await?;

        tracing::debug!(table = %self.principals_table(), "DynamoDB health check passed");
        Ok(())
    }
}
