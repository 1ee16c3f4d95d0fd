//! Configuration management module
//!
//! This module handles loading and validating application configuration
//! from environment variables and .env files.

pub mod aws;
pub mod settings;

pub use aws::{create_dynamodb_client, AwsConfigBuilder};
pub use settings::{
    AdminTokenConfig, CorsConfig, CounterBackend, Environment, IdentityProviderConfig,
    PrincipalBackend, RateLimitConfig, Settings,
};
