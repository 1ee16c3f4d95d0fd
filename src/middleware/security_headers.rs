//! Security header injection
//!
//! Runs on the way out for every response, including ones produced by earlier
//! stages short-circuiting.

use axum::{
    http::{header, HeaderName, HeaderValue},
    response::Response,
};

use crate::middleware::pipeline::{RequestHead, Stage};

pub const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; img-src 'self' data:; script-src 'self'; style-src 'self' 'unsafe-inline'; font-src 'self'; object-src 'none'; base-uri 'self';";

/// Fixed hardening headers attached to every response
pub const SECURITY_HEADERS: [(HeaderName, &str); 7] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=31536000; includeSubDomains; preload",
    ),
    (header::CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY),
    (header::REFERRER_POLICY, "no-referrer-when-downgrade"),
    (
        HeaderName::from_static("permissions-policy"),
        "geolocation=(), microphone=(), camera=()",
    ),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityHeaders;

impl SecurityHeaders {
    /// Set the header set, replacing existing values, and drop `Server`.
    pub fn apply(response: &mut Response) {
        let headers = response.headers_mut();
        headers.remove(header::SERVER);

        for (name, value) in SECURITY_HEADERS {
            headers.insert(name, HeaderValue::from_static(value));
        }
    }
}

impl Stage for SecurityHeaders {
    fn name(&self) -> &'static str {
        "security_headers"
    }

    fn on_response(&self, _head: &RequestHead, response: &mut Response) {
        Self::apply(response);
    }
}
