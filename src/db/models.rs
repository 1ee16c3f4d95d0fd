//! DynamoDB data models

use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resolved identity of an authenticated caller.
///
/// Stored in the principals table with `uid` (the identity provider subject)
/// as partition key. Fetched fresh for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable subject identifier issued by the identity provider
    pub uid: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Account status (e.g. "active", "suspended")
    pub status: String,

    #[serde(default)]
    pub credits: i64,

    #[serde(default)]
    pub is_admin: bool,

    /// Unix timestamp when the record was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl Principal {
    /// Minimal active principal, used when seeding stores
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            status: "active".to_string(),
            credits: 0,
            is_admin: false,
            created_at: Some(chrono::Utc::now().timestamp()),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Parse from DynamoDB item
    pub fn from_dynamodb(item: &HashMap<String, AttributeValue>) -> Option<Self> {
        Some(Self {
            uid: get_string(item, "uid")?,
            email: get_string(item, "email"),
            status: get_string(item, "status").unwrap_or_else(|| "active".to_string()),
            credits: get_number(item, "credits").unwrap_or(0),
            is_admin: get_bool(item, "is_admin").unwrap_or(false),
            created_at: get_number(item, "created_at"),
        })
    }
}

fn get_string(item: &HashMap<String, AttributeValue>, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).map(|s| s.to_string())
}

fn get_number(item: &HashMap<String, AttributeValue>, key: &str) -> Option<i64> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
}

fn get_bool(item: &HashMap<String, AttributeValue>, key: &str) -> Option<bool> {
    item.get(key).and_then(|v| v.as_bool().ok()).copied()
}
