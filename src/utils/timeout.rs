//! Timeout utilities for external calls
//!
//! Every call the pipeline makes to a collaborator (counter store, identity
//! provider, principal store) is bounded. A timeout is reported as its own
//! error kind so each stage can map it onto its failure semantics.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout configuration for external collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Timeout for counter store increments (default: 2s)
    pub counter_store: Duration,

    /// Timeout for identity provider token verification (default: 5s)
    pub identity_provider: Duration,

    /// Timeout for principal lookups (default: 5s)
    pub principal_store: Duration,

    /// Timeout for readiness and startup checks (default: 5s)
    pub health_check: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            counter_store: Duration::from_secs(2),
            identity_provider: Duration::from_secs(5),
            principal_store: Duration::from_secs(5),
            health_check: Duration::from_secs(5),
        }
    }
}

impl TimeoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counter_store(mut self, timeout: Duration) -> Self {
        self.counter_store = timeout;
        self
    }

    pub fn with_identity_provider(mut self, timeout: Duration) -> Self {
        self.identity_provider = timeout;
        self
    }

    pub fn with_principal_store(mut self, timeout: Duration) -> Self {
        self.principal_store = timeout;
        self
    }

    /// Create config from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_u64("COUNTER_STORE_TIMEOUT_MS") {
            config.counter_store = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("IDENTITY_PROVIDER_TIMEOUT_SECS") {
            config.identity_provider = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PRINCIPAL_STORE_TIMEOUT_SECS") {
            config.principal_store = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("HEALTH_CHECK_TIMEOUT_SECS") {
            config.health_check = Duration::from_secs(secs);
        }

        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Apply timeout to an async operation
pub async fn with_timeout<T, E>(
    timeout: Duration,
    future: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, TimeoutError<E>> {
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TimeoutError::Inner(err)),
        Err(_) => Err(TimeoutError::Timeout(timeout)),
    }
}

/// Error type for timeout operations
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Inner(E),
}

impl<E> TimeoutError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutError::Timeout(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            TimeoutError::Inner(e) => Some(e),
            TimeoutError::Timeout(_) => None,
        }
    }
}
