//! Pub/Sub (v1 REST) rendition of [`Publisher`].
//!
//! `POST {endpoint}/v1/{topic}:publish` with one message whose `data` is the
//! base64 of the JSON document, the same encoding the trigger function
//! decodes on the way in.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use adpipe_events::{PublishError, Publisher};
use adpipe_pipeline::SecretStore;

pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";

pub struct PubSubPublisher {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn SecretStore>,
    token_secret: String,
}

impl std::fmt::Debug for PubSubPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubPublisher")
            .field("endpoint", &self.endpoint)
            .field("token_secret", &self.token_secret)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct PublishRequest {
    messages: Vec<PubSubMessage>,
}

#[derive(Debug, Serialize)]
struct PubSubMessage {
    data: String,
}

impl PubSubPublisher {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        tokens: Arc<dyn SecretStore>,
        token_secret: impl Into<String>,
    ) -> Result<Self, PublishError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PublishError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
            token_secret: token_secret.into(),
        })
    }

    /// `topic` is the full topic path (`projects/{p}/topics/{t}`).
    pub fn publish_url(&self, topic: &str) -> String {
        format!("{}/v1/{}:publish", self.endpoint, topic)
    }
}

/// Request body publishing `message` as a single Pub/Sub message.
pub fn publish_body(message: &Value) -> Value {
    let request = PublishRequest {
        messages: vec![PubSubMessage {
            data: STANDARD.encode(message.to_string()),
        }],
    };
    serde_json::to_value(request).unwrap_or(Value::Null)
}

#[async_trait]
impl Publisher for PubSubPublisher {
    async fn publish(&self, topic: &str, message: Value) -> Result<(), PublishError> {
        if topic.is_empty() {
            return Err(PublishError::EmptyTopic);
        }

        let token = self
            .tokens
            .fetch_secret(&self.token_secret)
            .await
            .map_err(|e| PublishError::Transport(format!("no access token: {e}")))?;

        let url = self.publish_url(topic);
        debug!(%url, "publishing message");
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&publish_body(&message))
            .send()
            .await
            .map_err(|e| PublishError::Transport(format!("publish request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(PublishError::Transport(format!("HTTP {}: {body}", status.as_u16())))
    }
}
