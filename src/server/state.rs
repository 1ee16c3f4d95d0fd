//! Application state container
//!
//! This module defines the shared application state that is passed
//! to all request handlers and pipeline stages.

use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{create_dynamodb_client, CounterBackend, PrincipalBackend, Settings};
use crate::db::{
    CounterStore, DynamoDbClient, InMemoryCounterStore, InMemoryPrincipalStore, PrincipalRepository, PrincipalStore,
    RedisCounterStore,
};
use crate::services::{AdminTokenService, IdentityProvider, JwksIdentityProvider};
use crate::utils::{with_timeout, Clock, SystemClock};

/// External collaborators of the gateway
///
/// Built from settings by [`AppState::new`]; tests construct it directly with
/// in-memory stores and a scripted identity provider.
#[derive(Clone)]
pub struct Backends {
    pub counters: Arc<dyn CounterStore>,
    pub principals: Arc<dyn PrincipalStore>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub clock: Arc<dyn Clock>,
}

/// Shared application state
///
/// Cheaply cloneable (via Arc) and thread-safe.
#[derive(Clone)]
pub struct AppState {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Rate limit counters
    pub counters: Arc<dyn CounterStore>,

    /// Principal records keyed by identity provider subject
    pub principals: Arc<dyn PrincipalStore>,

    /// ID token verification
    pub identity_provider: Arc<dyn IdentityProvider>,

    /// Admin token verification and issuing
    pub admin_tokens: Arc<AdminTokenService>,

    /// Time source for rate limit windows
    pub clock: Arc<dyn Clock>,

    /// Application start time (for uptime calculation)
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state
    ///
    /// Connects the configured backends and checks that both stores are
    /// reachable; an unreachable store aborts startup.
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let settings = Arc::new(settings);

        let counters: Arc<dyn CounterStore> = match settings.rate_limit.backend {
            CounterBackend::Redis => {
                tracing::debug!(url = %settings.rate_limit.redis_url, "Connecting to Redis counter store");
                let store = with_timeout(
                    settings.timeouts.health_check,
                    RedisCounterStore::connect(&settings.rate_limit.redis_url),
                )
                .await
                .context("Failed to connect to Redis counter store")?;
                Arc::new(store)
            }
            CounterBackend::Memory => {
                tracing::info!("Using in-memory rate limit counters");
                Arc::new(InMemoryCounterStore::new())
            }
        };

        let principals: Arc<dyn PrincipalStore> = match settings.principal_store {
            PrincipalBackend::DynamoDb => {
                tracing::debug!(
                    region = %settings.aws_region,
                    endpoint = ?settings.dynamodb_endpoint_url,
                    table = %settings.dynamodb_principals_table,
                    "Creating DynamoDB client"
                );
                let sdk_client = create_dynamodb_client(&settings).await;
                let dynamodb = Arc::new(DynamoDbClient::new(settings.clone(), sdk_client));
                Arc::new(PrincipalRepository::new(dynamodb))
            }
            PrincipalBackend::Memory => {
                tracing::info!("Using in-memory principal store");
                Arc::new(InMemoryPrincipalStore::new())
            }
        };

        let identity_provider = Arc::new(
            JwksIdentityProvider::new(&settings.identity_provider, settings.timeouts.identity_provider)
                .context("Failed to create identity provider client")?,
        );

        let state = Self::with_backends(
            settings,
            Backends {
                counters,
                principals,
                identity_provider,
                clock: Arc::new(SystemClock),
            },
        )?;

        state.verify_backends().await?;

        tracing::info!("Application state initialized successfully");
        Ok(state)
    }

    /// Assemble state from already constructed backends
    pub fn with_backends(settings: Arc<Settings>, backends: Backends) -> anyhow::Result<Self> {
        let admin_tokens =
            AdminTokenService::new(&settings.admin_token).context("Admin token signing is not configured")?;

        Ok(Self {
            settings,
            counters: backends.counters,
            principals: backends.principals,
            identity_provider: backends.identity_provider,
            admin_tokens: Arc::new(admin_tokens),
            clock: backends.clock,
            start_time: Instant::now(),
        })
    }

    /// Fail-fast connectivity check run once at startup
    pub async fn verify_backends(&self) -> anyhow::Result<()> {
        let timeout = self.settings.timeouts.health_check;

        with_timeout(timeout, self.principals.ping())
            .await
            .context("Principal store is unreachable")?;

        with_timeout(timeout, self.counters.ping())
            .await
            .context("Counter store is unreachable")?;

        Ok(())
    }

    /// Get the application uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check the health of both stores
    pub async fn check_backend_health(&self) -> BackendHealthStatus {
        let timeout = self.settings.timeouts.health_check;

        let (counters, principals) = tokio::join!(
            with_timeout(timeout, self.counters.ping()),
            with_timeout(timeout, self.principals.ping()),
        );

        if let Err(e) = &counters {
            tracing::warn!(error = %e, "Counter store health check failed");
        }
        if let Err(e) = &principals {
            tracing::warn!(error = %e, "Principal store health check failed");
        }

        BackendHealthStatus {
            counter_store: counters.is_ok(),
            principal_store: principals.is_ok(),
        }
    }
}

/// Health status of the stores
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendHealthStatus {
    pub counter_store: bool,
    pub principal_store: bool,
}

impl BackendHealthStatus {
    pub fn all_healthy(&self) -> bool {
        self.counter_store && self.principal_store
    }
}
