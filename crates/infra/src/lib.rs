//! Infrastructure: configuration and networked renditions of the
//! collaborator capabilities (batch service, pipeline store, reference data,
//! publisher, secrets).

pub mod batch_rest;
pub mod config;
pub mod pipeline_store;
pub mod publisher;
pub mod reference_data;
pub mod secrets;

pub use batch_rest::RestBatchClient;
pub use config::{ConfigError, TrainerConfig, TriggerConfig};
pub use pipeline_store::RestPipelineStore;
pub use publisher::PubSubPublisher;
pub use reference_data::BucketReferenceLoader;
pub use secrets::EnvSecretStore;
