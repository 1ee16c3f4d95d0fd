//! Locally signed admin tokens
//!
//! Admin tokens are HMAC-signed JWTs verified with the process-wide secret,
//! without any identity provider round trip. The issuer claim keeps them
//! apart from other tokens signed with the same secret.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AdminTokenConfig;

/// Claims carried by an admin token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub iss: String,
    pub exp: u64,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AdminTokenError {
    #[error("admin signing secret is not configured")]
    MissingSecret,

    #[error("admin token rejected: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Verifies and issues admin tokens
#[derive(Clone)]
pub struct AdminTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
}

impl AdminTokenService {
    /// # Errors
    /// Returns [`AdminTokenError::MissingSecret`] when no secret is configured.
    pub fn new(config: &AdminTokenConfig) -> Result<Self, AdminTokenError> {
        let secret = config.secret.as_deref().ok_or(AdminTokenError::MissingSecret)?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: config.algorithm,
            issuer: config.issuer.clone(),
        })
    }

    /// Verify signature, expiry and issuer
    ///
    /// The `is_admin` claim is returned as-is; deciding what a non-admin
    /// token may do is up to the caller.
    pub fn verify(&self, token: &str) -> Result<AdminClaims, AdminTokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_aud = false;

        let data = decode::<AdminClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }

    /// Mint an admin token for `subject`, valid for `ttl`
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<String, AdminTokenError> {
        let claims = AdminClaims {
            sub: Some(subject.to_string()),
            iss: self.issuer.clone(),
            exp: chrono::Utc::now().timestamp() as u64 + ttl.as_secs(),
            is_admin: true,
        };

        Ok(encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}
