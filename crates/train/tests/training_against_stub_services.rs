//! A training run wired to the networked clients, against stubs of the
//! document store, the storage bucket and the Pub/Sub publish surface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use adpipe_core::PipelineId;
use adpipe_infra::{BucketReferenceLoader, PubSubPublisher, RestPipelineStore};
use adpipe_pipeline::{InMemorySecretStore, PipelineDataStore, ReferenceObject};
use adpipe_train::{TrainError, Trainer, TrainerSettings};

const TOKEN: &str = "t0k";
const TOPIC: &str = "projects/proj/topics/pipeline-status";

#[derive(Clone, Default)]
struct Stub {
    documents: Arc<Mutex<HashMap<String, Value>>>,
    objects: Arc<Mutex<HashMap<(String, String), Value>>>,
    published: Arc<Mutex<Vec<(String, Value)>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

async fn load_document(
    State(stub): State<Stub>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    match stub.documents.lock().unwrap().get(&id) {
        Some(doc) => (StatusCode::OK, Json(doc.clone())),
        None => (StatusCode::NOT_FOUND, Json(json!({}))),
    }
}

async fn save_document(
    State(stub): State<Stub>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(doc): Json<Value>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    stub.documents.lock().unwrap().insert(id, doc);
    StatusCode::OK
}

async fn read_object(
    State(stub): State<Stub>,
    Path((bucket, object)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    match stub.objects.lock().unwrap().get(&(bucket, object)) {
        Some(data) => (StatusCode::OK, Json(data.clone())),
        None => (StatusCode::NOT_FOUND, Json(json!({}))),
    }
}

async fn publish(
    State(stub): State<Stub>,
    Path((project, topic)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    let Some(topic) = topic.strip_suffix(":publish") else {
        return (StatusCode::NOT_FOUND, Json(json!({})));
    };
    let mut published = stub.published.lock().unwrap();
    for message in body["messages"].as_array().unwrap() {
        let data = STANDARD.decode(message["data"].as_str().unwrap()).unwrap();
        published.push((
            format!("projects/{project}/topics/{topic}"),
            serde_json::from_slice(&data).unwrap(),
        ));
    }
    (StatusCode::OK, Json(json!({ "messageIds": ["1"] })))
}

struct TestServer {
    base_url: String,
    stub: Stub,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let stub = Stub::default();
        let app = Router::new()
            .route("/store/pipelines/:id", get(load_document).put(save_document))
            .route("/storage/:bucket/:object", get(read_object))
            .route("/v1/projects/:project/topics/:topic", post(publish))
            .with_state(stub.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { base_url, stub, handle }
    }

    fn with_object(self, bucket: &str, object: &str, data: Value) -> Self {
        self.stub
            .objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), object.to_string()), data);
        self
    }

    fn pipeline_store(&self) -> RestPipelineStore {
        let secrets = InMemorySecretStore::new().with_secret("token", TOKEN);
        RestPipelineStore::new(&format!("{}/store", self.base_url), Arc::new(secrets), "token").unwrap()
    }

    fn trainer(&self, settings: TrainerSettings) -> Trainer<RestPipelineStore, BucketReferenceLoader, PubSubPublisher> {
        let secrets = Arc::new(InMemorySecretStore::new().with_secret("token", TOKEN));
        Trainer::new(
            self.pipeline_store(),
            BucketReferenceLoader::with_endpoint(format!("{}/storage", self.base_url)).unwrap(),
            PubSubPublisher::new(&self.base_url, secrets, "token").unwrap(),
            settings,
        )
    }

    fn published(&self) -> Vec<(String, Value)> {
        self.stub.published.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn id(s: &str) -> PipelineId {
    PipelineId::new(s).unwrap()
}

#[tokio::test]
async fn stored_configuration_and_reference_data_reach_the_status_topic() {
    let srv = TestServer::spawn()
        .await
        .with_object("ref-data", "rates.json", json!({ "eur": 1.1 }));
    srv.pipeline_store()
        .save_current_pipeline_data(
            &id("p1"),
            json!({ "current_configuration": { "epochs": 10 }, "history": [] }),
        )
        .await
        .unwrap();

    let trainer = srv.trainer(
        TrainerSettings::new(TOPIC).with_reference(ReferenceObject::new("ref-data", "rates.json")),
    );
    let inputs = trainer.prepare(&id("p1")).await.unwrap();

    assert_eq!(inputs.model.configuration.get("epochs"), Some(&json!(10)));
    assert_eq!(inputs.reference, Some(json!({ "eur": 1.1 })));
    assert_eq!(
        srv.published(),
        vec![(
            TOPIC.to_string(),
            json!({
                "pipeline_id": "p1",
                "training": "ready",
                "configuration": { "epochs": 10 },
                "reference_loaded": true
            })
        )]
    );
}

#[tokio::test]
async fn unknown_pipeline_is_announced_as_failed() {
    let srv = TestServer::spawn().await;

    let err = srv.trainer(TrainerSettings::new(TOPIC)).prepare(&id("ghost")).await.unwrap_err();

    assert!(matches!(err, TrainError::Model(_)));
    let published = srv.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].1["training"], "failed");
    assert_eq!(published[0].1["pipeline_id"], "ghost");
}

#[tokio::test]
async fn missing_bucket_object_is_tolerated() {
    let srv = TestServer::spawn().await;
    srv.pipeline_store()
        .save_current_pipeline_data(&id("p1"), json!({ "current_configuration": {} }))
        .await
        .unwrap();

    let trainer = srv.trainer(
        TrainerSettings::new(TOPIC).with_reference(ReferenceObject::new("ref-data", "gone.json")),
    );
    let inputs = trainer.prepare(&id("p1")).await.unwrap();

    assert_eq!(inputs.reference, None);
    assert_eq!(srv.published()[0].1["reference_loaded"], json!(false));
}

#[tokio::test]
async fn store_without_a_token_fails_to_load() {
    let srv = TestServer::spawn().await;
    let store = RestPipelineStore::new(
        &format!("{}/store", srv.base_url),
        Arc::new(InMemorySecretStore::new().with_secret("token", "wrong")),
        "token",
    )
    .unwrap();

    assert!(store.load_current_pipeline_data(&id("p1")).await.is_err());
    assert_eq!(
        srv.pipeline_store().load_current_pipeline_data(&id("p1")).await.unwrap(),
        None
    );
}
