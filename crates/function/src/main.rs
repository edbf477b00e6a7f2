use std::sync::Arc;

use anyhow::Context;

use adpipe_batch::Controller;
use adpipe_infra::{EnvSecretStore, RestBatchClient, TriggerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    adpipe_observability::init();

    let config = TriggerConfig::from_env().context("invalid configuration")?;

    let batch = RestBatchClient::new(
        config.batch_endpoint.clone(),
        Arc::new(EnvSecretStore::new()),
        config.token_secret.clone(),
    )
    .context("failed to build batch client")?;

    let controller = Arc::new(Controller::new(batch, config.controller_settings()));
    let app = adpipe_function::app::build_app(controller);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        project = %config.target.project_id,
        location = %config.target.location,
        "listening"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
