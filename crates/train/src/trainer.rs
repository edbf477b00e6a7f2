//! Preparing a training run.
//!
//! Building and fitting the model is the model code's concern; this module
//! gathers its inputs and announces the result:
//!
//! 1. resolve `current_configuration` from the pipeline document
//! 2. load the reference document, when one is configured (missing data is
//!    logged and the run continues without it)
//! 3. publish a status message on the status topic, `ready` or `failed`

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};

use adpipe_core::PipelineId;
use adpipe_events::{PublishError, Publisher};
use adpipe_pipeline::{
    ModelConfig, ModelConfigError, ModelConfigResolver, PipelineDataStore, ReferenceDataSource,
    ReferenceObject,
};

/// Field of a status message carrying the [`TrainingStatus`].
pub const TRAINING_STATUS_FIELD: &str = "training";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrainingStatus {
    Ready,
    Failed,
}

impl TrainingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TrainingStatus::Ready => "ready",
            TrainingStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Model(#[from] ModelConfigError),

    #[error("failed to publish training status: {0}")]
    Publish(#[from] PublishError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainerSettings {
    pub status_topic: String,
    pub reference: Option<ReferenceObject>,
}

impl TrainerSettings {
    pub fn new(status_topic: impl Into<String>) -> Self {
        Self {
            status_topic: status_topic.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: ReferenceObject) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// Everything the model code needs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingInputs {
    pub model: ModelConfig,
    pub reference: Option<Value>,
}

pub struct Trainer<S, R, P> {
    resolver: ModelConfigResolver<S>,
    reference_data: R,
    publisher: P,
    settings: TrainerSettings,
}

impl<S, R, P> std::fmt::Debug for Trainer<S, R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<S, R, P> Trainer<S, R, P>
where
    S: PipelineDataStore,
    R: ReferenceDataSource,
    P: Publisher,
{
    pub fn new(store: S, reference_data: R, publisher: P, settings: TrainerSettings) -> Self {
        Self {
            resolver: ModelConfigResolver::new(store),
            reference_data,
            publisher,
            settings,
        }
    }

    /// Gather the inputs for `pipeline_id` and publish the outcome.
    ///
    /// A configuration failure is still announced as `failed` before it is
    /// returned; a publish failure on that path is logged, not returned.
    pub async fn prepare(&self, pipeline_id: &PipelineId) -> Result<TrainingInputs, TrainError> {
        let span = info_span!("training", %pipeline_id);
        async move {
            let model = match self.resolver.resolve(pipeline_id).await {
                Ok(model) => model,
                Err(e) => {
                    error!(error = %e, "model configuration unavailable");
                    let message = status_message(pipeline_id, TrainingStatus::Failed, |m| {
                        m.insert("reason".into(), json!(e.to_string()));
                    });
                    if let Err(publish) = self.publisher.publish(&self.settings.status_topic, message).await {
                        warn!(error = %publish, "failed to publish training failure");
                    }
                    return Err(e.into());
                }
            };

            let reference = self.load_reference().await;

            let message = status_message(pipeline_id, TrainingStatus::Ready, |m| {
                m.insert("configuration".into(), Value::Object(model.configuration.clone()));
                m.insert("reference_loaded".into(), json!(reference.is_some()));
            });
            self.publisher.publish(&self.settings.status_topic, message).await?;

            info!(
                keys = model.configuration.len(),
                reference_loaded = reference.is_some(),
                "training inputs ready"
            );
            Ok(TrainingInputs { model, reference })
        }
        .instrument(span)
        .await
    }

    async fn load_reference(&self) -> Option<Value> {
        let location = self.settings.reference.as_ref()?;
        let data = self.reference_data.load(&location.bucket, &location.object).await;
        if data.is_none() {
            warn!(
                bucket = %location.bucket,
                object = %location.object,
                "continuing without reference data"
            );
        }
        data
    }
}

fn status_message(
    pipeline_id: &PipelineId,
    status: TrainingStatus,
    extend: impl FnOnce(&mut Map<String, Value>),
) -> Value {
    let mut message = Map::new();
    message.insert("pipeline_id".into(), json!(pipeline_id.as_str()));
    message.insert(TRAINING_STATUS_FIELD.into(), json!(status.as_str()));
    extend(&mut message);
    Value::Object(message)
}
