//! Identity resolution middleware
//!
//! Route groups that need a caller identity put an [`IdentityStage`] in front
//! of their handlers. The stage resolves the identity from the request headers
//! and stores it in the request extensions, where handlers pick it up with the
//! [`CurrentPrincipal`], [`MaybePrincipal`] and [`Admin`] extractors.
//!
//! Three resolvers are provided:
//! - [`MandatoryResolver`]: bearer ID token verified by the identity provider,
//!   then mapped to a provisioned [`Principal`]
//! - [`OptionalResolver`]: the same, but every failure means "anonymous"
//! - [`PrivilegedResolver`]: locally signed admin token with the admin claim

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
};
use std::sync::Arc;

use crate::db::{Principal, PrincipalStore};
use crate::error::{AuthFailure, GatewayError};
use crate::middleware::pipeline::{Stage, StageOutcome};
use crate::services::{AdminClaims, AdminTokenService, IdentityProvider, ProviderError};
use crate::utils::{redact_token, with_timeout, TimeoutConfig, TimeoutError};

pub const NOT_ADMIN_MESSAGE: &str = "Not authorized as admin";

// ============================================================================
// Bearer extraction
// ============================================================================

/// Extract the bearer credential from the `Authorization` header
///
/// The `Bearer ` prefix is optional and matched case-insensitively. An empty
/// credential counts as absent.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();

    let token = match value.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => &value[7..],
        _ => value,
    }
    .trim();

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

// ============================================================================
// Resolvers
// ============================================================================

/// Resolves a caller identity from request headers
#[async_trait]
pub trait ResolveIdentity: Send + Sync {
    type Identity: Clone + Send + Sync + 'static;

    const NAME: &'static str;

    async fn resolve(&self, headers: &HeaderMap) -> Result<Self::Identity, GatewayError>;
}

/// ID token + provisioned principal; any failure rejects the request
#[derive(Clone)]
pub struct MandatoryResolver {
    provider: Arc<dyn IdentityProvider>,
    principals: Arc<dyn PrincipalStore>,
    timeouts: TimeoutConfig,
}

impl MandatoryResolver {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        principals: Arc<dyn PrincipalStore>,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            provider,
            principals,
            timeouts,
        }
    }
}

#[async_trait]
impl ResolveIdentity for MandatoryResolver {
    type Identity = Principal;

    const NAME: &'static str = "identity_mandatory";

    async fn resolve(&self, headers: &HeaderMap) -> Result<Principal, GatewayError> {
        let token = bearer_token(headers).ok_or(GatewayError::Unauthenticated(AuthFailure::MissingToken))?;

        let verified = match with_timeout(self.timeouts.identity_provider, self.provider.verify_token(token)).await {
            Ok(verified) => verified,
            Err(TimeoutError::Inner(ProviderError::Invalid)) => {
                tracing::debug!(token = %redact_token(token), "Invalid ID token");
                return Err(GatewayError::Unauthenticated(AuthFailure::InvalidToken));
            }
            Err(TimeoutError::Inner(ProviderError::Expired)) => {
                tracing::debug!(token = %redact_token(token), "Expired ID token");
                return Err(GatewayError::Unauthenticated(AuthFailure::ExpiredToken));
            }
            Err(err) => {
                tracing::warn!(
                    token = %redact_token(token),
                    error = %err,
                    "Identity provider verification failed"
                );
                return Err(GatewayError::Unauthenticated(AuthFailure::VerificationFailed));
            }
        };

        let principal = with_timeout(
            self.timeouts.principal_store,
            self.principals.find_by_subject(&verified.subject),
        )
        .await
        .map_err(|e| GatewayError::Internal(anyhow::Error::new(e).context("principal lookup failed")))?;

        match principal {
            Some(principal) => {
                tracing::debug!(uid = %principal.uid, "Principal resolved");
                Ok(principal)
            }
            None => {
                tracing::warn!(subject = %verified.subject, "Verified subject has no principal record");
                Err(GatewayError::Unauthenticated(AuthFailure::NotProvisioned))
            }
        }
    }
}

/// Principal if the caller could be authenticated
#[derive(Debug, Clone, PartialEq)]
pub struct MaybePrincipal(pub Option<Principal>);

/// Mandatory resolution with every failure downgraded to "no principal"
#[derive(Clone)]
pub struct OptionalResolver {
    inner: MandatoryResolver,
}

impl OptionalResolver {
    pub fn new(inner: MandatoryResolver) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ResolveIdentity for OptionalResolver {
    type Identity = MaybePrincipal;

    const NAME: &'static str = "identity_optional";

    async fn resolve(&self, headers: &HeaderMap) -> Result<MaybePrincipal, GatewayError> {
        match self.inner.resolve(headers).await {
            Ok(principal) => Ok(MaybePrincipal(Some(principal))),
            Err(err) => {
                tracing::debug!(reason = %err, "Proceeding without principal");
                Ok(MaybePrincipal(None))
            }
        }
    }
}

/// Locally signed admin token carrying `is_admin`
///
/// Never consults the identity provider.
#[derive(Clone)]
pub struct PrivilegedResolver {
    tokens: Arc<AdminTokenService>,
}

impl PrivilegedResolver {
    pub fn new(tokens: Arc<AdminTokenService>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl ResolveIdentity for PrivilegedResolver {
    type Identity = AdminClaims;

    const NAME: &'static str = "identity_privileged";

    async fn resolve(&self, headers: &HeaderMap) -> Result<AdminClaims, GatewayError> {
        let token = bearer_token(headers).ok_or(GatewayError::Unauthenticated(AuthFailure::AdminMissing))?;

        let claims = self.tokens.verify(token).map_err(|e| {
            tracing::debug!(token = %redact_token(token), error = %e, "Admin token rejected");
            GatewayError::Unauthenticated(AuthFailure::InvalidCredentials)
        })?;

        if !claims.is_admin {
            tracing::warn!(sub = ?claims.sub, "Admin route called without admin claim");
            return Err(GatewayError::Forbidden(NOT_ADMIN_MESSAGE.to_string()));
        }

        Ok(claims)
    }
}

// ============================================================================
// Stage
// ============================================================================

/// Pipeline stage storing the resolved identity in request extensions
pub struct IdentityStage<R> {
    resolver: R,
}

impl<R: ResolveIdentity> IdentityStage<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl<R: ResolveIdentity + 'static> Stage for IdentityStage<R> {
    fn name(&self) -> &'static str {
        R::NAME
    }

    async fn on_request(&self, request: &mut Request) -> Result<StageOutcome, GatewayError> {
        let identity = self.resolver.resolve(request.headers()).await?;
        request.extensions_mut().insert(identity);
        Ok(StageOutcome::Continue)
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// Authenticated principal of a mandatory-identity route
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

/// Claims of a privileged route's admin token
#[derive(Debug, Clone)]
pub struct Admin(pub AdminClaims);

fn missing_stage(extractor: &str) -> GatewayError {
    GatewayError::internal(format!("{} used on a route without its identity stage", extractor))
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentPrincipal {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or_else(|| missing_stage("CurrentPrincipal"))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybePrincipal {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<MaybePrincipal>()
            .cloned()
            .ok_or_else(|| missing_stage("MaybePrincipal"))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Admin {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminClaims>()
            .cloned()
            .map(Admin)
            .ok_or_else(|| missing_stage("Admin"))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdminTokenConfig;
    use crate::db::{InMemoryPrincipalStore, PrincipalStoreError};
    use crate::services::identity_provider::ScriptedIdentityProvider;
    use axum::{body::Body, http::HeaderValue, http::StatusCode};
    use std::time::Duration;

    const ADMIN_SECRET: &str = "0123456789abcdef0123456789abcdef";

    struct UnavailablePrincipals;

    #[async_trait]
    impl PrincipalStore for UnavailablePrincipals {
        async fn find_by_subject(&self, _subject: &str) -> Result<Option<Principal>, PrincipalStoreError> {
            Err(PrincipalStoreError::DynamoDb("service unavailable".to_string()))
        }

        async fn ping(&self) -> Result<(), PrincipalStoreError> {
            Ok(())
        }
    }

    struct StalledPrincipals;

    #[async_trait]
    impl PrincipalStore for StalledPrincipals {
        async fn find_by_subject(&self, _subject: &str) -> Result<Option<Principal>, PrincipalStoreError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }

        async fn ping(&self) -> Result<(), PrincipalStoreError> {
            Ok(())
        }
    }

    fn headers(authorization: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = authorization {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    fn provider() -> ScriptedIdentityProvider {
        ScriptedIdentityProvider::new()
            .accept("good-token", "uid-1")
            .accept("orphan-token", "uid-unknown")
            .reject("expired-token", ProviderError::Expired)
            .reject("flaky-token", ProviderError::Other("jwks fetch failed".to_string()))
    }

    async fn mandatory_with(provider: ScriptedIdentityProvider) -> MandatoryResolver {
        let store = InMemoryPrincipalStore::new();
        store.insert(Principal::new("uid-1").with_email("one@example.com")).await;

        MandatoryResolver::new(
            Arc::new(provider),
            Arc::new(store),
            TimeoutConfig::default().with_identity_provider(Duration::from_millis(50)),
        )
    }

    async fn mandatory() -> MandatoryResolver {
        mandatory_with(provider()).await
    }

    fn admin_service() -> Arc<AdminTokenService> {
        let config = AdminTokenConfig {
            secret: Some(ADMIN_SECRET.to_string()),
            ..Default::default()
        };
        Arc::new(AdminTokenService::new(&config).unwrap())
    }

    fn auth_failure(result: Result<impl std::fmt::Debug, GatewayError>) -> AuthFailure {
        match result {
            Err(GatewayError::Unauthenticated(failure)) => failure,
            other => panic!("expected authentication failure, got {:?}", other),
        }
    }

    #[test]
    fn test_bearer_token_forms() {
        assert_eq!(bearer_token(&headers(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&headers(Some("bearer   abc  "))), Some("abc"));
        assert_eq!(bearer_token(&headers(Some("abc"))), Some("abc"));
        assert_eq!(bearer_token(&headers(Some("Bearer "))), None);
        assert_eq!(bearer_token(&headers(None)), None);
    }

    #[tokio::test]
    async fn test_mandatory_resolves_principal() {
        let principal = mandatory().await.resolve(&headers(Some("Bearer good-token"))).await.unwrap();
        assert_eq!(principal.uid, "uid-1");
        assert_eq!(principal.email.as_deref(), Some("one@example.com"));
    }

    #[tokio::test]
    async fn test_mandatory_failure_reasons() {
        let resolver = mandatory().await;

        let cases = [
            (None, AuthFailure::MissingToken),
            (Some("Bearer nonsense"), AuthFailure::InvalidToken),
            (Some("Bearer expired-token"), AuthFailure::ExpiredToken),
            (Some("Bearer flaky-token"), AuthFailure::VerificationFailed),
            (Some("Bearer orphan-token"), AuthFailure::NotProvisioned),
        ];

        for (authorization, expected) in cases {
            let result = resolver.resolve(&headers(authorization)).await;
            assert_eq!(auth_failure(result), expected, "authorization {:?}", authorization);
        }
    }

    #[tokio::test]
    async fn test_mandatory_provider_timeout_is_unauthenticated() {
        let slow = provider().with_delay(Duration::from_millis(500));
        let resolver = mandatory_with(slow).await;

        let result = resolver.resolve(&headers(Some("Bearer good-token"))).await;
        assert_eq!(auth_failure(result), AuthFailure::VerificationFailed);
    }

    #[tokio::test]
    async fn test_mandatory_store_failure_is_internal() {
        let resolver = MandatoryResolver::new(
            Arc::new(provider()),
            Arc::new(UnavailablePrincipals),
            TimeoutConfig::default(),
        );

        let err = resolver.resolve(&headers(Some("Bearer good-token"))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_mandatory_store_timeout_is_internal() {
        let resolver = MandatoryResolver::new(
            Arc::new(provider()),
            Arc::new(StalledPrincipals),
            TimeoutConfig::default().with_principal_store(Duration::from_millis(50)),
        );

        let err = resolver.resolve(&headers(Some("Bearer good-token"))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_optional_never_fails() {
        let resolver = OptionalResolver::new(mandatory().await);

        for authorization in [None, Some("Bearer nonsense"), Some("Bearer expired-token")] {
            let resolved = resolver.resolve(&headers(authorization)).await.unwrap();
            assert_eq!(resolved, MaybePrincipal(None));
        }

        let resolved = resolver.resolve(&headers(Some("Bearer good-token"))).await.unwrap();
        assert_eq!(resolved.0.map(|p| p.uid).as_deref(), Some("uid-1"));
    }

    #[tokio::test]
    async fn test_optional_swallows_store_failure() {
        let resolver = OptionalResolver::new(MandatoryResolver::new(
            Arc::new(provider()),
            Arc::new(UnavailablePrincipals),
            TimeoutConfig::default(),
        ));

        let resolved = resolver.resolve(&headers(Some("Bearer good-token"))).await.unwrap();
        assert_eq!(resolved, MaybePrincipal(None));
    }

    #[tokio::test]
    async fn test_privileged_outcomes() {
        let service = admin_service();
        let resolver = PrivilegedResolver::new(service.clone());

        let missing = resolver.resolve(&headers(None)).await;
        assert_eq!(auth_failure(missing), AuthFailure::AdminMissing);

        let garbage = resolver.resolve(&headers(Some("Bearer not-a-jwt"))).await;
        assert_eq!(auth_failure(garbage), AuthFailure::InvalidCredentials);

        let token = service.issue("ops", Duration::from_secs(60)).unwrap();
        let claims = resolver
            .resolve(&headers(Some(&format!("Bearer {}", token))))
            .await
            .unwrap();
        assert!(claims.is_admin);
    }

    #[tokio::test]
    async fn test_privileged_without_admin_claim_is_forbidden() {
        let claims = AdminClaims {
            sub: Some("ops".to_string()),
            iss: "request-gateway-admin".to_string(),
            exp: chrono::Utc::now().timestamp() as u64 + 60,
            is_admin: false,
        };
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(ADMIN_SECRET.as_bytes()),
        )
        .unwrap();

        let err = PrivilegedResolver::new(admin_service())
            .resolve(&headers(Some(&format!("Bearer {}", token))))
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), NOT_ADMIN_MESSAGE);
    }

    #[tokio::test]
    async fn test_privileged_never_calls_identity_provider() {
        // An ID token accepted by the provider is not an admin credential
        let err = PrivilegedResolver::new(admin_service())
            .resolve(&headers(Some("Bearer good-token")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_stage_stores_identity_in_extensions() {
        let stage = IdentityStage::new(mandatory().await);
        let mut request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer good-token")
            .body(Body::empty())
            .unwrap();

        assert!(matches!(
            stage.on_request(&mut request).await,
            Ok(StageOutcome::Continue)
        ));
        assert_eq!(
            request.extensions().get::<Principal>().map(|p| p.uid.as_str()),
            Some("uid-1")
        );
        assert_eq!(stage.name(), "identity_mandatory");
    }

    #[tokio::test]
    async fn test_extractor_without_stage_is_internal() {
        let (mut parts, _) = Request::builder().body(Body::empty()).unwrap().into_parts();

        let err = CurrentPrincipal::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
