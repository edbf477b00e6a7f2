//! Pipeline documents over a JSON REST document store.
//!
//! - load: `GET {endpoint}/pipelines/{pipeline_id}` (404 means no document)
//! - save: `PUT {endpoint}/pipelines/{pipeline_id}` with the document as body
//!
//! Pipeline ids are opaque, so they travel as one escaped path segment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use adpipe_core::PipelineId;
use adpipe_pipeline::{PipelineDataStore, SecretStore, StoreError};

pub struct RestPipelineStore {
    http: reqwest::Client,
    endpoint: Url,
    tokens: Arc<dyn SecretStore>,
    token_secret: String,
}

impl std::fmt::Debug for RestPipelineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestPipelineStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("token_secret", &self.token_secret)
            .finish_non_exhaustive()
    }
}

impl RestPipelineStore {
    /// # Errors
    ///
    /// Returns an error if the endpoint is not an absolute URL or the HTTP
    /// client cannot be built.
    pub fn new(
        endpoint: &str,
        tokens: Arc<dyn SecretStore>,
        token_secret: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| StoreError::Storage(format!("invalid pipeline store endpoint `{endpoint}`: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(StoreError::Storage(format!(
                "pipeline store endpoint `{endpoint}` cannot carry a path"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StoreError::Storage(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            tokens,
            token_secret: token_secret.into(),
        })
    }

    /// Document URL for a pipeline.
    pub fn document_url(&self, pipeline_id: &PipelineId) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("pipelines").push(pipeline_id.as_str());
        }
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let token = self
            .tokens
            .fetch_secret(&self.token_secret)
            .await
            .map_err(|e| StoreError::Storage(format!("no access token: {e}")))?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StoreError::Storage(format!("pipeline store request failed: {e}")))
    }
}

fn unexpected(status: StatusCode, body: String) -> StoreError {
    StoreError::Storage(format!("pipeline store answered HTTP {}: {body}", status.as_u16()))
}

#[async_trait]
impl PipelineDataStore for RestPipelineStore {
    async fn load_current_pipeline_data(&self, pipeline_id: &PipelineId) -> Result<Option<Value>, StoreError> {
        let url = self.document_url(pipeline_id);
        debug!(%url, "loading pipeline data");
        let response = self.send(self.http.get(url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<Value>()
                .await
                .map(Some)
                .map_err(|e| StoreError::Storage(format!("pipeline document is not valid JSON: {e}"))),
            status => Err(unexpected(status, response.text().await.unwrap_or_default())),
        }
    }

    async fn save_current_pipeline_data(&self, pipeline_id: &PipelineId, data: Value) -> Result<(), StoreError> {
        let url = self.document_url(pipeline_id);
        debug!(%url, "saving pipeline data");
        let response = self.send(self.http.put(url).json(&data)).await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(unexpected(status, response.text().await.unwrap_or_default()))
    }
}
