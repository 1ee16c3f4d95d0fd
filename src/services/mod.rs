//! Services module
//!
//! Token verification: the external identity provider and locally signed
//! admin tokens.

pub mod admin_token;
pub mod identity_provider;

pub use admin_token::{AdminClaims, AdminTokenError, AdminTokenService};
pub use identity_provider::{IdentityProvider, JwksIdentityProvider, ProviderError, VerifiedToken};
