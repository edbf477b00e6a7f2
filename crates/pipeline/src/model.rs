//! Model configuration lookup.
//!
//! The configuration blob is passed through untouched; turning it into a
//! model topology is the training job's concern.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error};

use adpipe_core::PipelineId;

use crate::store::{PipelineDataStore, StoreError};

/// Key of the active model configuration inside a pipeline document.
pub const CURRENT_CONFIGURATION_FIELD: &str = "current_configuration";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    pub pipeline_id: PipelineId,
    pub configuration: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelConfigError {
    #[error("no pipeline data for `{0}`")]
    PipelineNotFound(PipelineId),

    #[error("pipeline `{0}` has no `current_configuration`")]
    MissingConfiguration(PipelineId),

    #[error("`current_configuration` of pipeline `{0}` is not an object")]
    InvalidConfiguration(PipelineId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolves the active model configuration of a pipeline.
#[derive(Debug)]
pub struct ModelConfigResolver<S> {
    store: S,
}

impl<S: PipelineDataStore> ModelConfigResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, pipeline_id: &PipelineId) -> Result<ModelConfig, ModelConfigError> {
        let data = self
            .store
            .load_current_pipeline_data(pipeline_id)
            .await?
            .ok_or_else(|| {
                error!(%pipeline_id, "failed to load pipeline data");
                ModelConfigError::PipelineNotFound(pipeline_id.clone())
            })?;

        let configuration = match data.get(CURRENT_CONFIGURATION_FIELD) {
            None => {
                error!(%pipeline_id, "current_configuration not found in pipeline data");
                return Err(ModelConfigError::MissingConfiguration(pipeline_id.clone()));
            }
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(ModelConfigError::InvalidConfiguration(pipeline_id.clone())),
        };

        debug!(%pipeline_id, keys = configuration.len(), "model configuration resolved");
        Ok(ModelConfig {
            pipeline_id: pipeline_id.clone(),
            configuration,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::InMemoryPipelineStore;

    fn id(s: &str) -> PipelineId {
        PipelineId::new(s).unwrap()
    }

    #[tokio::test]
    async fn resolves_current_configuration() {
        let store = InMemoryPipelineStore::new().with_pipeline(
            id("p1"),
            json!({ "current_configuration": { "hidden_layers": [32, 16] }, "history": [] }),
        );

        let config = ModelConfigResolver::new(store).resolve(&id("p1")).await.unwrap();

        assert_eq!(config.pipeline_id, id("p1"));
        assert_eq!(config.configuration.get("hidden_layers"), Some(&json!([32, 16])));
    }

    #[tokio::test]
    async fn missing_pipeline_and_missing_configuration_are_distinct() {
        let store = InMemoryPipelineStore::new()
            .with_pipeline(id("bare"), json!({ "history": [] }))
            .with_pipeline(id("odd"), json!({ "current_configuration": 7 }));
        let resolver = ModelConfigResolver::new(store);

        assert_eq!(
            resolver.resolve(&id("nope")).await.unwrap_err(),
            ModelConfigError::PipelineNotFound(id("nope"))
        );
        assert_eq!(
            resolver.resolve(&id("bare")).await.unwrap_err(),
            ModelConfigError::MissingConfiguration(id("bare"))
        );
        assert_eq!(
            resolver.resolve(&id("odd")).await.unwrap_err(),
            ModelConfigError::InvalidConfiguration(id("odd"))
        );
    }
}
