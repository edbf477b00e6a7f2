//! Training-side entrypoint: the batch job launched by the trigger function.
//!
//! The job receives its pipeline through the `PIPELINE_ID` environment
//! variable, resolves the pipeline's active model configuration, loads
//! optional reference data, and reports readiness on the status topic.

pub mod trainer;

pub use trainer::{
    TRAINING_STATUS_FIELD, TrainError, Trainer, TrainerSettings, TrainingInputs, TrainingStatus,
};
