//! Principal repository
//!
//! Data access for principal records, behind the [`PrincipalStore`] trait so
//! the identity resolver can run against DynamoDB or an in-memory map.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::models::Principal;
use crate::db::DynamoDbClient;

/// Lookup of principals by identity provider subject
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Find the principal provisioned for `subject`
    async fn find_by_subject(&self, subject: &str) -> Result<Option<Principal>, PrincipalStoreError>;

    /// Check connectivity; a failure at startup aborts the process
    async fn ping(&self) -> Result<(), PrincipalStoreError>;
}

/// Errors that can occur during principal operations
#[derive(Debug, thiserror::Error)]
pub enum PrincipalStoreError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// DynamoDB-backed principal repository
#[derive(Clone)]
pub struct PrincipalRepository {
    client: Arc<DynamoDbClient>,
}

impl PrincipalRepository {
    pub fn new(client: Arc<DynamoDbClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PrincipalStore for PrincipalRepository {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<Principal>, PrincipalStoreError> {
        let result = self
            .client
            .client()
            .get_item()
            .table_name(self.client.principals_table())
            .key("uid", AttributeValue::S(subject.to_string()))
            .send()
            .await
            .map_err(|e| PrincipalStoreError::DynamoDb(e.to_string()))?;

        let Some(item) = result.item else {
            return Ok(None);
        };

        match Principal::from_dynamodb(&item) {
            Some(principal) => Ok(Some(principal)),
            None => Err(PrincipalStoreError::ParseError(format!(
                "principal record for subject {} is missing uid",
                subject
            ))),
        }
    }

    async fn ping(&self) -> Result<(), PrincipalStoreError> {
        self.client
            .health_check()
            .await
            .map_err(|e| PrincipalStoreError::DynamoDb(e.to_string()))
    }
}

/// Process-local principal store for development and tests
#[derive(Debug, Default, Clone)]
pub struct InMemoryPrincipalStore {
    principals: Arc<RwLock<HashMap<String, Principal>>>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, principal: Principal) {
        self.principals
            .write()
            .await
            .insert(principal.uid.clone(), principal);
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<Principal>, PrincipalStoreError> {
        Ok(self.principals.read().await.get(subject).cloned())
    }

    async fn ping(&self) -> Result<(), PrincipalStoreError> {
        Ok(())
    }
}
