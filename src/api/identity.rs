//! Identity-aware endpoints
//!
//! Minimal dispatch targets for each identity variant; they echo what the
//! identity stage resolved.

use axum::Json;
use serde::Serialize;

use crate::db::Principal;
use crate::middleware::{Admin, CurrentPrincipal, MaybePrincipal};

#[derive(Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
}

#[derive(Serialize)]
pub struct AdminResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub issuer: String,
    pub expires_at: u64,
}

/// GET /v1/me (mandatory identity)
pub async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> Json<Principal> {
    Json(principal)
}

/// GET /v1/session (optional identity)
pub async fn session(MaybePrincipal(principal): MaybePrincipal) -> Json<SessionResponse> {
    Json(SessionResponse {
        authenticated: principal.is_some(),
        principal,
    })
}

/// GET /admin/whoami (privileged identity)
pub async fn admin_whoami(Admin(claims): Admin) -> Json<AdminResponse> {
    Json(AdminResponse {
        subject: claims.sub,
        issuer: claims.iss,
        expires_at: claims.exp,
    })
}
