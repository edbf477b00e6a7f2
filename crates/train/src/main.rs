use std::sync::Arc;

use anyhow::Context;

use adpipe_infra::{BucketReferenceLoader, EnvSecretStore, PubSubPublisher, RestPipelineStore, TrainerConfig};
use adpipe_pipeline::SecretStore;
use adpipe_train::{Trainer, TrainerSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    adpipe_observability::init();

    let config = TrainerConfig::from_env().context("invalid configuration")?;
    let tokens: Arc<dyn SecretStore> = Arc::new(EnvSecretStore::new());

    let store = RestPipelineStore::new(&config.pipeline_store_endpoint, tokens.clone(), config.token_secret.clone())
        .context("failed to build pipeline store client")?;
    let reference_data = BucketReferenceLoader::with_endpoint(config.storage_endpoint.clone())
        .context("failed to build reference data client")?;
    let publisher = PubSubPublisher::new(config.pubsub_endpoint.clone(), tokens, config.token_secret.clone())
        .context("failed to build publisher")?;

    let trainer = Trainer::new(
        store,
        reference_data,
        publisher,
        TrainerSettings {
            status_topic: config.status_topic.clone(),
            reference: config.reference.clone(),
        },
    );

    let inputs = trainer
        .prepare(&config.pipeline_id)
        .await
        .with_context(|| format!("training preparation failed for `{}`", config.pipeline_id))?;

    tracing::info!(
        pipeline_id = %config.pipeline_id,
        keys = inputs.model.configuration.len(),
        reference_loaded = inputs.reference.is_some(),
        "training inputs published"
    );
    Ok(())
}
