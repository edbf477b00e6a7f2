//! Pipeline data store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use adpipe_core::PipelineId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Holds the current data document of each pipeline.
#[async_trait]
pub trait PipelineDataStore: Send + Sync {
    /// Current document for `pipeline_id`, or `None` if the pipeline is unknown.
    async fn load_current_pipeline_data(&self, pipeline_id: &PipelineId) -> Result<Option<Value>, StoreError>;

    /// Replace the current document for `pipeline_id`.
    async fn save_current_pipeline_data(&self, pipeline_id: &PipelineId, data: Value) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> PipelineDataStore for Arc<S>
where
    S: PipelineDataStore + ?Sized,
{
    async fn load_current_pipeline_data(&self, pipeline_id: &PipelineId) -> Result<Option<Value>, StoreError> {
        (**self).load_current_pipeline_data(pipeline_id).await
    }

    async fn save_current_pipeline_data(&self, pipeline_id: &PipelineId, data: Value) -> Result<(), StoreError> {
        (**self).save_current_pipeline_data(pipeline_id, data).await
    }
}

/// In-memory pipeline store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPipelineStore {
    inner: RwLock<HashMap<PipelineId, Value>>,
}

impl InMemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding.
    pub fn with_pipeline(self, pipeline_id: PipelineId, data: Value) -> Self {
        if let Ok(mut map) = self.inner.write() {
            map.insert(pipeline_id, data);
        }
        self
    }
}

#[async_trait]
impl PipelineDataStore for InMemoryPipelineStore {
    async fn load_current_pipeline_data(&self, pipeline_id: &PipelineId) -> Result<Option<Value>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::Storage("pipeline store lock poisoned".to_string()))?;
        Ok(map.get(pipeline_id).cloned())
    }

    async fn save_current_pipeline_data(&self, pipeline_id: &PipelineId, data: Value) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::Storage("pipeline store lock poisoned".to_string()))?;
        map.insert(pipeline_id.clone(), data);
        Ok(())
    }
}
