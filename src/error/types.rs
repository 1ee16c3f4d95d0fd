//! Gateway error types

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message returned for every system error. Causes stay in the server log.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request too large")]
    PayloadTooLarge,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Disallowed CORS {0}")]
    CorsRejected(String),

    #[error("{0}")]
    Unauthenticated(AuthFailure),

    #[error("{0}")]
    Forbidden(String),

    #[error("Not Found")]
    NotFound,

    #[error("Internal server error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

/// Reasons a caller could not be authenticated.
///
/// The messages are part of the client contract: retry logic distinguishes an
/// expired credential from an invalid one.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("No authorization token provided")]
    MissingToken,

    #[error("Invalid ID token")]
    InvalidToken,

    #[error("Expired ID token")]
    ExpiredToken,

    #[error("User not provisioned")]
    NotProvisioned,

    #[error("Authentication failed")]
    VerificationFailed,

    #[error("Not authenticated")]
    AdminMissing,

    #[error("Invalid authentication credentials")]
    InvalidCredentials,
}

impl GatewayError {
    pub fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal(anyhow::anyhow!(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::InvalidRequest(_) | GatewayError::CorsRejected(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();

        let detail = match &self {
            GatewayError::Internal(err) => {
                tracing::error!(error = %format!("{:#}", err), "Request failed with internal error");
                INTERNAL_ERROR_MESSAGE.to_string()
            }
            other => other.to_string(),
        };

        let mut response = (status, Json(ErrorBody { detail })).into_response();

        match self {
            GatewayError::Unauthenticated(_) => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            GatewayError::RateLimited { retry_after_secs } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            }
            _ => {}
        }

        response
    }
}

/// JSON body of every error response: `{"detail": "..."}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}
