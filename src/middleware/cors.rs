//! Origin policy (CORS)
//!
//! Preflight requests are answered here and never reach later stages. For
//! every other request the policy only decorates the response.

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use std::collections::HashSet;

use crate::config::CorsConfig;
use crate::error::GatewayError;
use crate::middleware::pipeline::{RequestHead, Stage, StageOutcome};

/// Headers a browser may always send; never need to be listed explicitly.
const SAFELISTED_HEADERS: [&str; 4] = ["accept", "accept-language", "content-language", "content-type"];

pub struct OriginPolicy {
    origins: HashSet<String>,
    methods: Vec<Method>,
    headers: Vec<HeaderName>,
    allow_credentials: bool,
    allow_methods_value: HeaderValue,
    allow_headers_value: HeaderValue,
    expose_headers_value: Option<HeaderValue>,
    max_age_value: HeaderValue,
}

impl OriginPolicy {
    /// Build the policy, rejecting method or header names that are not valid
    /// HTTP tokens.
    pub fn new(config: &CorsConfig) -> anyhow::Result<Self> {
        let methods = config
            .allowed_methods
            .iter()
            .map(|m| Method::from_bytes(m.trim().to_uppercase().as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut headers = config
            .allowed_headers
            .iter()
            .map(|h| HeaderName::from_bytes(h.trim().as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        for safelisted in SAFELISTED_HEADERS {
            let name = HeaderName::from_static(safelisted);
            if !headers.contains(&name) {
                headers.push(name);
            }
        }

        let expose = config
            .expose_headers
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Self {
            origins: config.allowed_origins.iter().map(|o| o.trim().to_string()).collect(),
            allow_methods_value: HeaderValue::from_str(&join(methods.iter().map(Method::as_str)))?,
            allow_headers_value: HeaderValue::from_str(&join(headers.iter().map(HeaderName::as_str)))?,
            expose_headers_value: if expose.is_empty() {
                None
            } else {
                Some(HeaderValue::from_str(&expose)?)
            },
            max_age_value: HeaderValue::from(config.max_age_seconds),
            methods,
            headers,
            allow_credentials: config.allow_credentials,
        })
    }

    pub fn is_origin_allowed(&self, origin: &HeaderValue) -> bool {
        origin
            .to_str()
            .map(|o| self.origins.contains(o))
            .unwrap_or(false)
    }

    fn is_method_allowed(&self, requested: &HeaderValue) -> bool {
        requested
            .to_str()
            .map(|m| self.methods.iter().any(|allowed| allowed.as_str() == m.trim()))
            .unwrap_or(false)
    }

    fn are_headers_allowed(&self, requested: Option<&HeaderValue>) -> bool {
        let Some(requested) = requested else {
            return true;
        };
        let Ok(requested) = requested.to_str() else {
            return false;
        };

        requested
            .split(',')
            .map(|h| h.trim().to_lowercase())
            .filter(|h| !h.is_empty())
            .all(|h| self.headers.iter().any(|allowed| allowed.as_str() == h))
    }

    fn preflight_response(&self, origin: &HeaderValue) -> Response {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();

        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods_value.clone());
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers_value.clone());
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age_value.clone());
        if self.allow_credentials {
            headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        append_vary_origin(headers);

        response
    }
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

fn is_preflight(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::OPTIONS
        && headers.contains_key(header::ORIGIN)
        && headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

fn append_vary_origin(headers: &mut HeaderMap) {
    let already_varies = headers.get_all(header::VARY).iter().any(|value| {
        value
            .to_str()
            .map(|v| v.split(',').any(|item| item.trim().eq_ignore_ascii_case("origin")))
            .unwrap_or(false)
    });

    if !already_varies {
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }
}

#[async_trait]
impl Stage for OriginPolicy {
    fn name(&self) -> &'static str {
        "origin_policy"
    }

    async fn on_request(&self, request: &mut Request) -> Result<StageOutcome, GatewayError> {
        let headers = request.headers();
        if !is_preflight(request.method(), headers) {
            return Ok(StageOutcome::Continue);
        }

        let (Some(origin), Some(method)) = (
            headers.get(header::ORIGIN),
            headers.get(header::ACCESS_CONTROL_REQUEST_METHOD),
        ) else {
            return Ok(StageOutcome::Continue);
        };

        let mut failures = Vec::new();
        if !self.is_origin_allowed(origin) {
            failures.push("origin");
        }
        if !self.is_method_allowed(method) {
            failures.push("method");
        }
        if !self.are_headers_allowed(headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS)) {
            failures.push("headers");
        }

        if !failures.is_empty() {
            tracing::debug!(
                origin = ?origin,
                failed = %failures.join(", "),
                "Rejected CORS preflight"
            );
            return Err(GatewayError::CorsRejected(failures.join(", ")));
        }

        Ok(StageOutcome::Respond(self.preflight_response(origin)))
    }

    fn on_response(&self, head: &RequestHead, response: &mut Response) {
        if is_preflight(&head.method, &head.headers) {
            return;
        }
        let Some(origin) = head.headers.get(header::ORIGIN) else {
            return;
        };
        if !self.is_origin_allowed(origin) {
            return;
        }

        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        if self.allow_credentials {
            headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if let Some(expose) = &self.expose_headers_value {
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, expose.clone());
        }
        append_vary_origin(headers);
    }
}
