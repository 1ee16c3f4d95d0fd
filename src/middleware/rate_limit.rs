//! Rate limiting middleware
//!
//! Fixed-window limiting per client address. Counters live in a shared
//! [`CounterStore`] so every gateway instance sees the same count; the key
//! embeds the window number, so a new window starts from zero without any
//! reset and stale counters simply expire.

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request},
    http::{Extensions, HeaderMap},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RateLimitConfig;
use crate::db::CounterStore;
use crate::error::GatewayError;
use crate::middleware::pipeline::{Stage, StageOutcome};
use crate::utils::{with_timeout, Clock};

/// Bucket used when the client address cannot be determined
pub const UNKNOWN_CLIENT: &str = "unknown";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Fixed-window rate limiter stage
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    requests_per_window: u64,
    window_seconds: u64,
    key_prefix: String,
    trust_forwarded_for: bool,
    store_timeout: Duration,
}

impl RateLimiter {
    pub fn new(
        config: &RateLimitConfig,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            requests_per_window: config.requests_per_window,
            window_seconds: config.window_seconds.max(1),
            key_prefix: config.key_prefix.clone(),
            trust_forwarded_for: config.trust_forwarded_for,
            store_timeout,
        }
    }

    /// Counter key for `client` in the window containing `now`
    pub fn window_key(&self, client: &str, now: u64) -> String {
        format!("{}:{}:{}", self.key_prefix, client, now / self.window_seconds)
    }

    /// Seconds until the window containing `now` ends
    pub fn retry_after(&self, now: u64) -> u64 {
        self.window_seconds - now % self.window_seconds
    }
}

/// Resolve the client address used as the rate-limit identity
///
/// The peer address comes from `ConnectInfo`. Behind a reverse proxy the
/// first `X-Forwarded-For` entry is used instead, but only when explicitly
/// trusted since clients can set the header freely.
pub fn client_identity(headers: &HeaderMap, extensions: &Extensions, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(client) = forwarded {
            return client.to_string();
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

#[async_trait]
impl Stage for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limiter"
    }

    async fn on_request(&self, request: &mut Request) -> Result<StageOutcome, GatewayError> {
        let client = client_identity(request.headers(), request.extensions(), self.trust_forwarded_for);
        let now = self.clock.unix_seconds();
        let key = self.window_key(&client, now);

        let count = with_timeout(
            self.store_timeout,
            self.store.increment(&key, Duration::from_secs(self.window_seconds)),
        )
        .await
        .map_err(|e| GatewayError::Internal(anyhow::Error::new(e).context("rate limit counter increment failed")))?;

        if count > self.requests_per_window {
            let retry_after_secs = self.retry_after(now);

            tracing::warn!(
                client = %client,
                count = count,
                limit = self.requests_per_window,
                retry_after_seconds = retry_after_secs,
                "Rate limit exceeded"
            );

            return Err(GatewayError::RateLimited { retry_after_secs });
        }

        tracing::trace!(client = %client, count = count, "Rate limit check passed");
        Ok(StageOutcome::Continue)
    }
}
