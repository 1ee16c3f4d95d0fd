//! Application routing
//!
//! This module defines all HTTP routes and assembles the gateway pipeline
//! around them.

use axum::{
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;

use crate::api::{health, identity};
use crate::error::GatewayError;
use crate::middleware::{
    logging::log_request,
    pipeline::{run_pipeline, Pipeline},
    IdentityStage, MandatoryResolver, OptionalResolver, OriginPolicy, PayloadSizeGuard, PrivilegedResolver,
    RateLimiter, SecurityHeaders,
};
use crate::server::state::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> anyhow::Result<Router> {
    let gateway = gateway_pipeline(&state)?;

    let mandatory = MandatoryResolver::new(
        state.identity_provider.clone(),
        state.principals.clone(),
        state.settings.timeouts.clone(),
    );

    // Health and status routes (no identity)
    let health_routes = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        .route("/liveness", get(health::liveness));

    // route_layer: unknown paths under a prefix stay 404 instead of 401
    let member_routes = Router::new()
        .route("/me", get(identity::me))
        .route_layer(middleware::from_fn_with_state(
            Pipeline::new().with_stage(IdentityStage::new(mandatory.clone())),
            run_pipeline,
        ));

    let session_routes = Router::new()
        .route("/session", get(identity::session))
        .route_layer(middleware::from_fn_with_state(
            Pipeline::new().with_stage(IdentityStage::new(OptionalResolver::new(mandatory))),
            run_pipeline,
        ));

    let admin_routes = Router::new()
        .route("/whoami", get(identity::admin_whoami))
        .route_layer(middleware::from_fn_with_state(
            Pipeline::new().with_stage(IdentityStage::new(PrivilegedResolver::new(state.admin_tokens.clone()))),
            run_pipeline,
        ));

    let router = Router::new()
        .nest("/v1", member_routes.merge(session_routes))
        .nest("/admin", admin_routes)
        .merge(health_routes)
        .fallback(not_found)
        .with_state(state);

    Ok(with_gateway(router, gateway))
}

/// Build the global pipeline: origin policy, rate limiter, payload size
/// guard, security headers
pub fn gateway_pipeline(state: &AppState) -> anyhow::Result<Pipeline> {
    let settings = &state.settings;

    let mut pipeline = Pipeline::new().with_stage(OriginPolicy::new(&settings.cors)?);

    if settings.rate_limit.enabled {
        pipeline = pipeline.with_stage(RateLimiter::new(
            &settings.rate_limit,
            state.counters.clone(),
            state.clock.clone(),
            settings.timeouts.counter_store,
        ));
    } else {
        tracing::warn!("Rate limiting disabled");
    }

    Ok(pipeline
        .with_stage(PayloadSizeGuard::new(settings.max_payload_bytes))
        .with_stage(SecurityHeaders))
}

/// Wrap a router in the gateway layers
///
/// Layer order: last added = outermost = runs first. Request logging sees
/// every response; the pipeline sees panics already converted to a 500 so
/// they still get security headers.
pub fn with_gateway(router: Router, gateway: Pipeline) -> Router {
    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(gateway, run_pipeline))
        .layer(middleware::from_fn(log_request))
}

async fn not_found() -> GatewayError {
    GatewayError::NotFound
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    GatewayError::internal(format!("handler panicked: {}", message)).into_response()
}
