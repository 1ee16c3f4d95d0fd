//! Database module
//!
//! Contains the DynamoDB client, the principal data access layer and the
//! counter stores backing the rate limiter.

pub mod counters;
pub mod dynamodb;
pub mod models;
pub mod repositories;

pub use counters::{CounterStore, CounterStoreError, InMemoryCounterStore, RedisCounterStore};
pub use dynamodb::DynamoDbClient;
pub use models::Principal;
pub use repositories::{InMemoryPrincipalStore, PrincipalRepository, PrincipalStore, PrincipalStoreError};
