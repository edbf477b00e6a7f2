use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use adpipe_batch::{BatchService, Controller, InvocationOutcome, SupervisionOutcome};
use adpipe_core::InvocationId;

use crate::push::envelope_from_body;

/// Build the router around a shared controller.
///
/// `POST /` always answers `200 OK`: the delivery is acknowledged whatever the
/// outcome, so malformed or inapplicable events are not redelivered.
pub fn build_app<S>(controller: Arc<Controller<S>>) -> Router
where
    S: BatchService + 'static,
{
    Router::new()
        .route("/", post(push::<S>))
        .route("/health", get(health))
        .with_state(controller)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn push<S>(State(controller): State<Arc<Controller<S>>>, body: Bytes) -> Json<Value>
where
    S: BatchService + 'static,
{
    let invocation_id = InvocationId::new();
    let envelope = envelope_from_body(&body);
    let outcome = controller.handle_as(invocation_id, envelope).await;
    Json(outcome_summary(&invocation_id, &outcome))
}

/// JSON summary of an invocation returned to the pushing transport.
pub fn outcome_summary(invocation_id: &InvocationId, outcome: &InvocationOutcome) -> Value {
    let mut summary = json!({
        "invocation_id": invocation_id.to_string(),
        "outcome": outcome.label(),
    });

    match outcome {
        InvocationOutcome::Rejected(rejection) => {
            summary["reason"] = json!(rejection.reason_code());
            summary["detail"] = json!(rejection.to_string());
        }
        InvocationOutcome::SubmissionFailed { error } => {
            summary["detail"] = json!(error.to_string());
        }
        InvocationOutcome::SkippedConflict { logical_name, .. } => {
            summary["logical_name"] = json!(logical_name);
        }
        InvocationOutcome::SlotBusy {
            logical_name,
            occupant,
            state,
        } => {
            summary["logical_name"] = json!(logical_name);
            summary["occupant"] = json!(occupant.resource_name);
            summary["state"] = json!(state.to_string());
        }
        InvocationOutcome::Submitted(_) => {}
    }

    if let Some(job) = outcome.supervised() {
        summary["job"] = json!(job.handle.resource_name);
        summary["state"] = json!(job.supervision.last_state().to_string());
        summary["attempts"] = json!(job.supervision.attempts());
        summary["elapsed_secs"] = json!(job.supervision.elapsed().as_secs_f64());
        if let SupervisionOutcome::TimedOut { reason, .. } = &job.supervision {
            summary["exhausted"] = json!(reason.as_str());
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use tower::ServiceExt;

    use adpipe_batch::controller::DEFAULT_JOB_NAME_TEMPLATE;
    use adpipe_batch::{BatchTarget, ControllerSettings, InMemoryBatchService, render_name};

    use super::*;

    fn app() -> (Router, Arc<Controller<InMemoryBatchService>>) {
        let controller = Arc::new(Controller::new(
            InMemoryBatchService::new(),
            ControllerSettings::new(BatchTarget::new("proj", "us-central1"), "img"),
        ));
        (build_app(controller.clone()), controller)
    }

    async fn post_json(app: Router, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn push_delivery_is_submitted_and_summarised() {
        let (app, controller) = app();
        let data = STANDARD.encode(r#"{"status": 5, "pipeline_id": "p1"}"#);

        let (status, summary) = post_json(
            app,
            json!({ "message": { "data": data, "messageId": "m-1" }, "subscription": "s" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["outcome"], "accepted");
        assert_eq!(summary["state"], "SCHEDULED");
        assert_eq!(summary["attempts"], 1);
        assert_eq!(
            summary["job"],
            format!(
                "projects/proj/locations/us-central1/jobs/{}",
                render_name(DEFAULT_JOB_NAME_TEMPLATE, "p1")
            )
        );
        assert_eq!(controller.service().create_calls(), 1);
    }

    #[tokio::test]
    async fn inapplicable_event_is_acknowledged() {
        let (app, controller) = app();
        let data = STANDARD.encode(r#"{"status": 2}"#);

        let (status, summary) = post_json(app, json!({ "data": data })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["outcome"], "rejected_not_applicable");
        assert_eq!(summary["reason"], "not_applicable");
        assert!(controller.service().calls().is_empty());
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
