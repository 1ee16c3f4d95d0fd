//! Middleware module
//!
//! The gateway pipeline and its stages (origin policy, rate limiting, payload
//! size, security headers, identity resolution), plus request logging.

pub mod auth;
pub mod cors;
pub mod logging;
pub mod pipeline;
pub mod rate_limit;
pub mod security_headers;
pub mod size_limit;

// Re-export commonly used items
pub use auth::{
    bearer_token, Admin, CurrentPrincipal, IdentityStage, MandatoryResolver, MaybePrincipal, OptionalResolver,
    PrivilegedResolver, ResolveIdentity,
};
pub use cors::OriginPolicy;
pub use logging::{log_request, TraceId, REQUEST_ID_HEADER, TRACE_ID_HEADER};
pub use pipeline::{run_pipeline, Pipeline, RequestHead, Stage, StageOutcome};
pub use rate_limit::{client_identity, RateLimiter};
pub use security_headers::SecurityHeaders;
pub use size_limit::PayloadSizeGuard;
