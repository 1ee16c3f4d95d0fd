//! Ordered middleware pipeline
//!
//! Every gateway concern is a [`Stage`]. A [`Pipeline`] runs the request side
//! of its stages in order and stops at the first one that answers or fails;
//! the response side of every stage then runs in reverse order on whatever
//! response was produced, however far the request got.
//!
//! # Example
//!
//! ```ignore
//! let pipeline = Pipeline::new()
//!     .with_stage(OriginPolicy::new(&settings.cors)?)
//!     .with_stage(SecurityHeaders);
//!
//! Router::new()
//!     .route("/", get(root))
//!     .layer(axum::middleware::from_fn_with_state(pipeline, run_pipeline))
//! ```

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::GatewayError;

/// Result of the request side of a stage
pub enum StageOutcome {
    /// Hand the request to the next stage
    Continue,
    /// Answer directly; later stages and the handler are skipped
    Respond(Response),
}

/// Request method and headers as they arrived, before any stage ran.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn capture(request: &Request) -> Self {
        Self {
            method: request.method().clone(),
            headers: request.headers().clone(),
        }
    }
}

/// One element of a pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    async fn on_request(&self, _request: &mut Request) -> Result<StageOutcome, GatewayError> {
        Ok(StageOutcome::Continue)
    }

    fn on_response(&self, _head: &RequestHead, _response: &mut Response) {}
}

/// Immutable, cheaply cloneable list of stages
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            stages: Vec::new().into(),
        }
    }

    /// Append a stage; stages run in the order they are added
    pub fn with_stage<S: Stage + 'static>(self, stage: S) -> Self {
        self.with_shared_stage(Arc::new(stage))
    }

    pub fn with_shared_stage(self, stage: Arc<dyn Stage>) -> Self {
        let mut stages = self.stages.to_vec();
        stages.push(stage);
        Self {
            stages: stages.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Axum middleware driving a [`Pipeline`]
pub async fn run_pipeline(State(pipeline): State<Pipeline>, mut request: Request, next: Next) -> Response {
    let head = RequestHead::capture(&request);

    let mut response = 'dispatch: {
        for stage in pipeline.stages.iter() {
            match stage.on_request(&mut request).await {
                Ok(StageOutcome::Continue) => {}
                Ok(StageOutcome::Respond(response)) => {
                    tracing::debug!(stage = stage.name(), "Stage answered request");
                    break 'dispatch response;
                }
                Err(err) => {
                    tracing::debug!(stage = stage.name(), status = %err.status(), "Stage rejected request");
                    break 'dispatch err.into_response();
                }
            }
        }

        next.run(request).await
    };

    for stage in pipeline.stages.iter().rev() {
        stage.on_response(&head, &mut response);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use std::sync::Mutex;
    use tower::ServiceExt;

    type Journal = Arc<Mutex<Vec<String>>>;

    enum Behaviour {
        Pass,
        Answer,
        Fail,
    }

    struct Recorder {
        label: &'static str,
        behaviour: Behaviour,
        journal: Journal,
    }

    #[async_trait]
    impl Stage for Recorder {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn on_request(&self, _request: &mut Request) -> Result<StageOutcome, GatewayError> {
            self.journal.lock().unwrap().push(format!("req:{}", self.label));
            match self.behaviour {
                Behaviour::Pass => Ok(StageOutcome::Continue),
                Behaviour::Answer => Ok(StageOutcome::Respond(StatusCode::NO_CONTENT.into_response())),
                Behaviour::Fail => Err(GatewayError::PayloadTooLarge),
            }
        }

        fn on_response(&self, _head: &RequestHead, response: &mut Response) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("resp:{}:{}", self.label, response.status().as_u16()));
        }
    }

    fn recorder(label: &'static str, behaviour: Behaviour, journal: &Journal) -> Recorder {
        Recorder {
            label,
            behaviour,
            journal: journal.clone(),
        }
    }

    fn app(pipeline: Pipeline, journal: Journal) -> Router {
        Router::new()
            .route(
                "/",
                get(move || {
                    let journal = journal.clone();
                    async move {
                        journal.lock().unwrap().push("handler".to_string());
                        "ok"
                    }
                }),
            )
            .layer(axum::middleware::from_fn_with_state(pipeline, run_pipeline))
    }

    async fn call(app: Router) -> StatusCode {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_stages_run_in_order_and_unwind_in_reverse() {
        let journal = Journal::default();
        let pipeline = Pipeline::new()
            .with_stage(recorder("a", Behaviour::Pass, &journal))
            .with_stage(recorder("b", Behaviour::Pass, &journal));

        assert_eq!(call(app(pipeline, journal.clone())).await, StatusCode::OK);
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["req:a", "req:b", "handler", "resp:b:200", "resp:a:200"]
        );
    }

    #[tokio::test]
    async fn test_answer_short_circuits_but_every_stage_unwinds() {
        let journal = Journal::default();
        let pipeline = Pipeline::new()
            .with_stage(recorder("a", Behaviour::Answer, &journal))
            .with_stage(recorder("b", Behaviour::Pass, &journal));

        assert_eq!(call(app(pipeline, journal.clone())).await, StatusCode::NO_CONTENT);
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["req:a", "resp:b:204", "resp:a:204"]
        );
    }

    #[tokio::test]
    async fn test_error_becomes_response() {
        let journal = Journal::default();
        let pipeline = Pipeline::new()
            .with_stage(recorder("a", Behaviour::Pass, &journal))
            .with_stage(recorder("b", Behaviour::Fail, &journal))
            .with_stage(recorder("c", Behaviour::Pass, &journal));

        assert_eq!(call(app(pipeline, journal.clone())).await, StatusCode::PAYLOAD_TOO_LARGE);

        let journal = journal.lock().unwrap();
        assert!(!journal.contains(&"req:c".to_string()));
        assert!(!journal.contains(&"handler".to_string()));
        assert_eq!(journal.last().map(String::as_str), Some("resp:a:413"));
    }

    #[test]
    fn test_stage_names() {
        let journal = Journal::default();
        let pipeline = Pipeline::new()
            .with_stage(recorder("first", Behaviour::Pass, &journal))
            .with_stage(recorder("second", Behaviour::Pass, &journal));

        assert_eq!(pipeline.stage_names(), vec!["first", "second"]);
        assert_eq!(pipeline.len(), 2);
        assert!(Pipeline::new().is_empty());
    }
}
