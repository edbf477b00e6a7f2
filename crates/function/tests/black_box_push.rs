use std::sync::Arc;
use std::time::Duration;

use adpipe_batch::controller::DEFAULT_JOB_NAME_TEMPLATE;
use adpipe_batch::{
    BatchTarget, Controller, ControllerSettings, InMemoryBatchService, JobState, PollBudget,
    render_name,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    controller: Arc<Controller<InMemoryBatchService>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(service: InMemoryBatchService) -> Self {
        // Same router as prod, short polling so tests run in real time.
        let settings = ControllerSettings::new(BatchTarget::new("proj", "us-central1"), "gcr.io/proj/train:1")
            .with_budget(PollBudget::fixed(Duration::from_secs(2), Duration::from_millis(10)));
        let controller = Arc::new(Controller::new(service, settings));
        let app = adpipe_function::app::build_app(controller.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            controller,
            handle,
        }
    }

    async fn push(&self, body: String) -> (StatusCode, Value) {
        let res = reqwest::Client::new()
            .post(format!("{}/", self.base_url))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn delivery(document: Value) -> String {
    json!({
        "message": { "data": STANDARD.encode(document.to_string()), "messageId": "m-1" },
        "subscription": "projects/proj/subscriptions/model-generation"
    })
    .to_string()
}

#[tokio::test]
async fn generate_model_event_submits_and_confirms_job() {
    let srv = TestServer::spawn(
        InMemoryBatchService::new()
            .with_visibility_delay(2)
            .with_status_script(vec![JobState::Queued, JobState::Scheduled]),
    )
    .await;

    let (status, body) = srv.push(delivery(json!({ "status": 5, "pipeline_id": "p-42" }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "accepted");
    assert_eq!(body["attempts"], 4);
    assert_eq!(
        body["job"],
        format!(
            "projects/proj/locations/us-central1/jobs/{}",
            render_name(DEFAULT_JOB_NAME_TEMPLATE, "p-42")
        )
    );
    assert_eq!(srv.controller.service().create_calls(), 1);
}

#[tokio::test]
async fn malformed_bodies_are_acknowledged_without_service_calls() {
    let srv = TestServer::spawn(InMemoryBatchService::new()).await;

    for body in [
        "not json at all".to_string(),
        json!({ "message": {} }).to_string(),
        json!({ "message": { "data": "%%%" } }).to_string(),
        delivery(json!({ "pipeline_id": "p1" })),
        delivery(json!({ "status": 5 })),
    ] {
        let (status, summary) = srv.push(body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["outcome"], "rejected_malformed", "{summary}");
    }
    assert!(srv.controller.service().calls().is_empty());
}

#[tokio::test]
async fn other_message_types_are_ignored() {
    let srv = TestServer::spawn(InMemoryBatchService::new()).await;

    let (status, summary) = srv.push(delivery(json!({ "status": 4, "pipeline_id": "p1" }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["outcome"], "rejected_not_applicable");
    assert!(srv.controller.service().calls().is_empty());
}

#[tokio::test]
async fn repeated_delivery_replaces_the_fixed_name_job() {
    let srv = TestServer::spawn(InMemoryBatchService::new()).await;
    let body = delivery(json!({ "status": 5, "pipeline_id": "p1" }));

    let (_, first) = srv.push(body.clone()).await;
    let (_, second) = srv.push(body).await;

    assert_eq!(first["outcome"], "accepted");
    assert_eq!(second["outcome"], "accepted");
    assert_eq!(srv.controller.service().create_calls(), 2);
    assert_eq!(srv.controller.service().job_names().len(), 1);
}

#[tokio::test]
async fn health_endpoint() {
    let srv = TestServer::spawn(InMemoryBatchService::new()).await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
