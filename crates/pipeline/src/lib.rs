//! Collaborator capabilities around a pipeline.
//!
//! Each capability is a narrow async trait with an in-memory implementation
//! for tests/dev; networked renditions live in `adpipe-infra`.

pub mod model;
pub mod reference;
pub mod secrets;
pub mod store;

pub use model::{CURRENT_CONFIGURATION_FIELD, ModelConfig, ModelConfigError, ModelConfigResolver};
pub use reference::{InMemoryReferenceData, ReferenceDataSource, ReferenceObject};
pub use secrets::{InMemorySecretStore, SecretError, SecretStore};
pub use store::{InMemoryPipelineStore, PipelineDataStore, StoreError};
