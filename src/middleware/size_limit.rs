//! Payload size guard
//!
//! Rejects oversized bodies from the declared `Content-Length` alone; the body
//! itself is never read. Requests without the header (chunked uploads) are
//! not bounded here.

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header, Method},
};

use crate::error::GatewayError;
use crate::middleware::pipeline::{Stage, StageOutcome};

pub struct PayloadSizeGuard {
    max_bytes: u64,
}

impl PayloadSizeGuard {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    fn applies_to(method: &Method) -> bool {
        matches!(*method, Method::POST | Method::PUT | Method::PATCH)
    }
}

#[async_trait]
impl Stage for PayloadSizeGuard {
    fn name(&self) -> &'static str {
        "payload_size_guard"
    }

    async fn on_request(&self, request: &mut Request) -> Result<StageOutcome, GatewayError> {
        if !Self::applies_to(request.method()) {
            return Ok(StageOutcome::Continue);
        }

        let Some(value) = request.headers().get(header::CONTENT_LENGTH) else {
            return Ok(StageOutcome::Continue);
        };

        let declared = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| GatewayError::InvalidRequest("malformed Content-Length header".to_string()))?;

        if declared > self.max_bytes {
            tracing::warn!(
                content_length = declared,
                max_bytes = self.max_bytes,
                "Request body too large"
            );
            return Err(GatewayError::PayloadTooLarge);
        }

        Ok(StageOutcome::Continue)
    }
}
