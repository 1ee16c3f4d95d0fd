//! Application settings and configuration
//!
//! This module provides configuration management for the gateway,
//! loading settings from environment variables with sensible defaults.

use anyhow::{Context, Result};
use clap::ValueEnum;
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

use crate::utils::TimeoutConfig;

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!("Invalid environment: {}. Expected: development, staging, or production", s),
        }
    }
}

/// Backend holding the rate-limit counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterBackend {
    Redis,
    /// Process-local; only correct for a single instance
    Memory,
}

impl std::str::FromStr for CounterBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(CounterBackend::Redis),
            "memory" => Ok(CounterBackend::Memory),
            _ => anyhow::bail!("Invalid counter store: {}. Expected: redis or memory", s),
        }
    }
}

/// Backend holding principal records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalBackend {
    DynamoDb,
    Memory,
}

impl std::str::FromStr for PrincipalBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dynamodb" => Ok(PrincipalBackend::DynamoDb),
            "memory" => Ok(PrincipalBackend::Memory),
            _ => anyhow::bail!("Invalid principal store: {}. Expected: dynamodb or memory", s),
        }
    }
}

/// Cross-origin policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS", "PATCH"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: ["authorization", "content-type", "x-request-id", "x-trace-id"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            expose_headers: ["x-trace-id", "x-request-id", "retry-after"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            allow_credentials: true,
            max_age_seconds: 600,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_window: u64,
    pub window_seconds: u64,
    pub key_prefix: String,
    /// Take the client address from the first `X-Forwarded-For` entry
    pub trust_forwarded_for: bool,
    pub backend: CounterBackend,
    pub redis_url: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 100,
            window_seconds: 60,
            key_prefix: "rate_limit".to_string(),
            trust_forwarded_for: false,
            backend: CounterBackend::Memory,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
        }
    }
}

/// External identity provider (JWKS-verified ID tokens)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityProviderConfig {
    pub project_id: Option<String>,
    pub jwks_url: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl Default for IdentityProviderConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            jwks_url: "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com"
                .to_string(),
            issuer: None,
            audience: None,
        }
    }
}

impl IdentityProviderConfig {
    /// Expected `iss`; defaults to the secure token issuer of the project
    pub fn effective_issuer(&self) -> Option<String> {
        self.issuer.clone().or_else(|| {
            self.project_id
                .as_ref()
                .map(|p| format!("https://securetoken.google.com/{}", p))
        })
    }

    /// Expected `aud`; defaults to the project id
    pub fn effective_audience(&self) -> Option<String> {
        self.audience.clone().or_else(|| self.project_id.clone())
    }
}

/// Locally signed admin tokens
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminTokenConfig {
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub algorithm: Algorithm,
    pub issuer: String,
}

impl Default for AdminTokenConfig {
    fn default() -> Self {
        Self {
            secret: None,
            algorithm: Algorithm::HS256,
            issuer: "request-gateway-admin".to_string(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    // App settings
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,

    // Server settings
    pub host: String,
    pub port: u16,

    // Pipeline stages
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub max_payload_bytes: u64,

    // Principal store
    pub principal_store: PrincipalBackend,
    pub aws_region: String,
    pub dynamodb_endpoint_url: Option<String>,
    pub dynamodb_principals_table: String,

    // Identity
    pub identity_provider: IdentityProviderConfig,
    pub admin_token: AdminTokenConfig,

    // Collaborator timeouts
    pub timeouts: TimeoutConfig,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let settings = Self {
            app_name: env_or_default("APP_NAME", &defaults.app_name),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: env_or_default("ENVIRONMENT", "development")
                .parse()
                .context("Invalid ENVIRONMENT value")?,
            log_level: env_or_default("LOG_LEVEL", "info"),

            host: env_or_default("HOST", "0.0.0.0"),
            port: env_or_default("PORT", "8000")
                .parse()
                .context("Invalid PORT value")?,

            cors: CorsConfig {
                allowed_origins: env_list("CORS_ALLOWED_ORIGINS", &defaults.cors.allowed_origins),
                allowed_methods: env_list("CORS_ALLOWED_METHODS", &defaults.cors.allowed_methods),
                allowed_headers: env_list("CORS_ALLOWED_HEADERS", &defaults.cors.allowed_headers),
                expose_headers: env_list("CORS_EXPOSE_HEADERS", &defaults.cors.expose_headers),
                allow_credentials: env_or_default("CORS_ALLOW_CREDENTIALS", "true")
                    .parse()
                    .unwrap_or(true),
                max_age_seconds: env_or_default("CORS_MAX_AGE_SECONDS", "600")
                    .parse()
                    .unwrap_or(600),
            },

            rate_limit: RateLimitConfig {
                enabled: env_or_default("RATE_LIMIT_ENABLED", "true")
                    .parse()
                    .unwrap_or(true),
                requests_per_window: env_or_default("RATE_LIMIT_REQUESTS_PER_WINDOW", "100")
                    .parse()
                    .context("Invalid RATE_LIMIT_REQUESTS_PER_WINDOW value")?,
                window_seconds: env_or_default("RATE_LIMIT_WINDOW_SECONDS", "60")
                    .parse()
                    .context("Invalid RATE_LIMIT_WINDOW_SECONDS value")?,
                key_prefix: env_or_default("RATE_LIMIT_KEY_PREFIX", &defaults.rate_limit.key_prefix),
                trust_forwarded_for: env_or_default("RATE_LIMIT_TRUST_FORWARDED_FOR", "false")
                    .parse()
                    .unwrap_or(false),
                backend: env_or_default("COUNTER_STORE", "redis").parse()?,
                redis_url: env_or_default("REDIS_URL", &defaults.rate_limit.redis_url),
            },
            max_payload_bytes: env_or_default("MAX_PAYLOAD_BYTES", "10000000")
                .parse()
                .context("Invalid MAX_PAYLOAD_BYTES value")?,

            principal_store: env_or_default("PRINCIPAL_STORE", "dynamodb").parse()?,
            aws_region: env_or_default("AWS_REGION", "us-east-1"),
            dynamodb_endpoint_url: env::var("DYNAMODB_ENDPOINT_URL").ok(),
            dynamodb_principals_table: env_or_default(
                "DYNAMODB_PRINCIPALS_TABLE",
                &defaults.dynamodb_principals_table,
            ),

            identity_provider: IdentityProviderConfig {
                project_id: env::var("IDP_PROJECT_ID").ok(),
                jwks_url: env_or_default("IDP_JWKS_URL", &defaults.identity_provider.jwks_url),
                issuer: env::var("IDP_ISSUER").ok(),
                audience: env::var("IDP_AUDIENCE").ok(),
            },
            admin_token: AdminTokenConfig {
                secret: env::var("ADMIN_JWT_SECRET").ok().filter(|s| !s.is_empty()),
                algorithm: env_or_default("ADMIN_JWT_ALGORITHM", "HS256")
                    .parse()
                    .context("Invalid ADMIN_JWT_ALGORITHM value")?,
                issuer: env_or_default("ADMIN_JWT_ISSUER", &defaults.admin_token.issuer),
            },

            timeouts: TimeoutConfig::from_env(),
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.rate_limit.enabled {
            if self.rate_limit.requests_per_window == 0 {
                anyhow::bail!("Rate limit requests_per_window must be > 0");
            }
            if self.rate_limit.window_seconds == 0 {
                anyhow::bail!("Rate limit window_seconds must be > 0");
            }
        }

        if self.max_payload_bytes == 0 {
            anyhow::bail!("MAX_PAYLOAD_BYTES must be > 0");
        }

        // Browsers ignore wildcards on credentialed requests, so an explicit
        // list is the only consistent policy.
        if self.cors.allow_credentials {
            if self.cors.allowed_origins.iter().any(|o| o == "*") {
                anyhow::bail!("CORS_ALLOWED_ORIGINS cannot contain '*' when credentials are allowed");
            }
            if self.cors.allowed_headers.iter().any(|h| h == "*") {
                anyhow::bail!("CORS_ALLOWED_HEADERS cannot contain '*' when credentials are allowed");
            }
        }

        if !matches!(
            self.admin_token.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            anyhow::bail!("ADMIN_JWT_ALGORITHM must be one of HS256, HS384, HS512");
        }

        match &self.admin_token.secret {
            Some(secret) if secret.len() < 32 => {
                anyhow::bail!("ADMIN_JWT_SECRET must be at least 32 bytes");
            }
            None if self.is_production() => {
                anyhow::bail!("ADMIN_JWT_SECRET is required in production");
            }
            _ => {}
        }

        // ID tokens are only accepted for one project; without it every
        // project signed by the shared keys would be trusted.
        if self.identity_provider.effective_issuer().is_none() {
            anyhow::bail!("IDP_PROJECT_ID (or IDP_ISSUER) is required");
        }
        if self.identity_provider.effective_audience().is_none() {
            anyhow::bail!("IDP_PROJECT_ID (or IDP_AUDIENCE) is required");
        }

        if self.is_production() && self.rate_limit.backend == CounterBackend::Memory {
            tracing::warn!("Rate limit counters are process-local; limits are per instance");
        }

        Ok(())
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Get the server address string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Generate an admin signing secret for this process when none is
    /// configured. Returns `true` if a secret was generated.
    ///
    /// Production never gets an ephemeral secret; `validate` rejects a
    /// missing one there.
    pub fn generate_ephemeral_admin_secret(&mut self) -> bool {
        if self.admin_token.secret.is_some() || self.is_production() {
            return false;
        }

        let secret = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        self.admin_token.secret = Some(secret);
        true
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "request-gateway".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors: CorsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            max_payload_bytes: 10_000_000,
            principal_store: PrincipalBackend::Memory,
            aws_region: "us-east-1".to_string(),
            dynamodb_endpoint_url: None,
            dynamodb_principals_table: "gateway-principals".to_string(),
            identity_provider: IdentityProviderConfig::default(),
            admin_token: AdminTokenConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Comma separated list from the environment, falling back to `default`
fn env_list(key: &str, default: &[String]) -> Vec<String> {
    match env::var(key) {
        Ok(raw) => parse_list(&raw),
        Err(_) => default.to_vec(),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
