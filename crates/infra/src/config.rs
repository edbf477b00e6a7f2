//! Deployment configuration.
//!
//! Everything comes from `ADPIPE_*` environment variables; job defaults may
//! additionally come from a YAML file mirroring the batch job config used by
//! the deployment. Unset optional values fall back to the controller defaults.
//!
//! [`TriggerConfig`] configures the push function, [`TrainerConfig`] the
//! training job it launches (which also receives `PIPELINE_ID`).

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use adpipe_batch::controller::{DEFAULT_JOB_NAME_TEMPLATE, PIPELINE_ID_ENV};
use adpipe_batch::{
    AcceptancePolicy, BatchTarget, ControllerSettings, JobDefaults, JobState, PollBudget,
    SubmissionStrategy,
};
use adpipe_core::PipelineId;
use adpipe_pipeline::ReferenceObject;

use crate::publisher::DEFAULT_PUBSUB_ENDPOINT;
use crate::reference_data::DEFAULT_STORAGE_ENDPOINT;

pub const ENV_PROJECT_ID: &str = "ADPIPE_PROJECT_ID";
pub const ENV_LOCATION: &str = "ADPIPE_LOCATION";
pub const ENV_CONTAINER_IMAGE: &str = "ADPIPE_CONTAINER_IMAGE";
pub const ENV_STRATEGY: &str = "ADPIPE_SUBMISSION_STRATEGY";
pub const ENV_JOB_NAME_TEMPLATE: &str = "ADPIPE_JOB_NAME_TEMPLATE";
pub const ENV_POLL_MAX_SECONDS: &str = "ADPIPE_POLL_MAX_SECONDS";
pub const ENV_POLL_INTERVAL_SECONDS: &str = "ADPIPE_POLL_INTERVAL_SECONDS";
pub const ENV_POLL_BACKOFF: &str = "ADPIPE_POLL_BACKOFF";
pub const ENV_POLL_MAX_ATTEMPTS: &str = "ADPIPE_POLL_MAX_ATTEMPTS";
pub const ENV_POLL_MAX_TRANSIENT_FAILURES: &str = "ADPIPE_POLL_MAX_TRANSIENT_FAILURES";
pub const ENV_ACCEPT_STATES: &str = "ADPIPE_ACCEPT_STATES";
pub const ENV_ACCEPT_AT_OR_BEYOND: &str = "ADPIPE_ACCEPT_AT_OR_BEYOND";
pub const ENV_LISTEN_ADDR: &str = "ADPIPE_LISTEN_ADDR";
pub const ENV_PORT: &str = "PORT";
pub const ENV_JOB_DEFAULTS_PATH: &str = "ADPIPE_JOB_DEFAULTS_PATH";
pub const ENV_BATCH_ENDPOINT: &str = "ADPIPE_BATCH_ENDPOINT";
pub const ENV_TOKEN_SECRET: &str = "ADPIPE_TOKEN_SECRET";
pub const ENV_STATUS_TOPIC: &str = "ADPIPE_STATUS_TOPIC";
pub const ENV_PIPELINE_STORE_ENDPOINT: &str = "ADPIPE_PIPELINE_STORE_ENDPOINT";
pub const ENV_PUBSUB_ENDPOINT: &str = "ADPIPE_PUBSUB_ENDPOINT";
pub const ENV_STORAGE_ENDPOINT: &str = "ADPIPE_STORAGE_ENDPOINT";
pub const ENV_REFERENCE_BUCKET: &str = "ADPIPE_REFERENCE_BUCKET";
pub const ENV_REFERENCE_OBJECT: &str = "ADPIPE_REFERENCE_OBJECT";

pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_BATCH_ENDPOINT: &str = "https://batch.googleapis.com";
pub const DEFAULT_TOKEN_SECRET: &str = "ADPIPE_ACCESS_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to read job defaults from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid job defaults in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Full process configuration for the trigger function.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerConfig {
    pub target: BatchTarget,
    pub container_image: String,
    pub strategy: SubmissionStrategy,
    pub budget: PollBudget,
    pub acceptance: AcceptancePolicy,
    pub defaults: JobDefaults,
    pub listen_addr: SocketAddr,
    pub batch_endpoint: String,
    /// Name of the secret holding the bearer token for the batch API.
    pub token_secret: String,
}

impl TriggerConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or any present
    /// variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let project_id = get(ENV_PROJECT_ID).ok_or(ConfigError::Missing(ENV_PROJECT_ID))?;
        let container_image =
            get(ENV_CONTAINER_IMAGE).ok_or(ConfigError::Missing(ENV_CONTAINER_IMAGE))?;
        let location = get(ENV_LOCATION).unwrap_or_else(|| DEFAULT_LOCATION.to_string());

        let template =
            get(ENV_JOB_NAME_TEMPLATE).unwrap_or_else(|| DEFAULT_JOB_NAME_TEMPLATE.to_string());
        let strategy = match get(ENV_STRATEGY).as_deref() {
            None | Some("fixed") | Some("fixed_name") => SubmissionStrategy::fixed(template),
            Some("generated") => SubmissionStrategy::Generated,
            Some(other) => {
                return Err(ConfigError::invalid(
                    ENV_STRATEGY,
                    format!("expected `fixed` or `generated`, got `{other}`"),
                ));
            }
        };

        let budget = parse_budget(&get)?;
        let acceptance = parse_acceptance(get(ENV_ACCEPT_STATES), get(ENV_ACCEPT_AT_OR_BEYOND))?;

        let listen_addr = match (get(ENV_LISTEN_ADDR), get(ENV_PORT)) {
            (Some(addr), _) => addr,
            (None, Some(port)) => format!("0.0.0.0:{port}"),
            (None, None) => DEFAULT_LISTEN_ADDR.to_string(),
        };
        let listen_addr = listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid(ENV_LISTEN_ADDR, e.to_string()))?;

        let defaults = match get(ENV_JOB_DEFAULTS_PATH) {
            Some(path) => load_job_defaults(&path)?,
            None => JobDefaults::default(),
        };

        Ok(Self {
            target: BatchTarget::new(project_id, location),
            container_image,
            strategy,
            budget,
            acceptance,
            defaults,
            listen_addr,
            batch_endpoint: get(ENV_BATCH_ENDPOINT)
                .unwrap_or_else(|| DEFAULT_BATCH_ENDPOINT.to_string()),
            token_secret: get(ENV_TOKEN_SECRET).unwrap_or_else(|| DEFAULT_TOKEN_SECRET.to_string()),
        })
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings::new(self.target.clone(), self.container_image.clone())
            .with_strategy(self.strategy.clone())
            .with_budget(self.budget.clone())
            .with_acceptance(self.acceptance.clone())
            .with_defaults(self.defaults.clone())
    }
}

/// Process configuration for the training job.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerConfig {
    pub pipeline_id: PipelineId,
    /// Full topic path status messages are published to.
    pub status_topic: String,
    pub reference: Option<ReferenceObject>,
    pub pipeline_store_endpoint: String,
    pub pubsub_endpoint: String,
    pub storage_endpoint: String,
    pub token_secret: String,
}

impl TrainerConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, or only one half
    /// of the reference object location is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let pipeline_id = get(PIPELINE_ID_ENV)
            .map(PipelineId::new)
            .transpose()
            .map_err(|e| ConfigError::invalid(PIPELINE_ID_ENV, e.to_string()))?
            .ok_or(ConfigError::Missing(PIPELINE_ID_ENV))?;
        let status_topic = get(ENV_STATUS_TOPIC).ok_or(ConfigError::Missing(ENV_STATUS_TOPIC))?;
        let pipeline_store_endpoint =
            get(ENV_PIPELINE_STORE_ENDPOINT).ok_or(ConfigError::Missing(ENV_PIPELINE_STORE_ENDPOINT))?;

        let reference = match (get(ENV_REFERENCE_BUCKET), get(ENV_REFERENCE_OBJECT)) {
            (Some(bucket), Some(object)) => Some(ReferenceObject::new(bucket, object)),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(ENV_REFERENCE_OBJECT)),
            (None, Some(_)) => return Err(ConfigError::Missing(ENV_REFERENCE_BUCKET)),
        };

        Ok(Self {
            pipeline_id,
            status_topic,
            reference,
            pipeline_store_endpoint,
            pubsub_endpoint: get(ENV_PUBSUB_ENDPOINT).unwrap_or_else(|| DEFAULT_PUBSUB_ENDPOINT.to_string()),
            storage_endpoint: get(ENV_STORAGE_ENDPOINT).unwrap_or_else(|| DEFAULT_STORAGE_ENDPOINT.to_string()),
            token_secret: get(ENV_TOKEN_SECRET).unwrap_or_else(|| DEFAULT_TOKEN_SECRET.to_string()),
        })
    }
}

fn parse_budget(get: &impl Fn(&str) -> Option<String>) -> Result<PollBudget, ConfigError> {
    let max_wall_clock = env_secs(get, ENV_POLL_MAX_SECONDS)?.unwrap_or(Duration::from_secs(480));
    let interval = env_secs(get, ENV_POLL_INTERVAL_SECONDS)?.unwrap_or(Duration::from_secs(15));

    let mut budget = match get(ENV_POLL_BACKOFF).as_deref() {
        None | Some("fixed") => PollBudget::fixed(max_wall_clock, interval),
        Some("exponential") => PollBudget::exponential(max_wall_clock, interval),
        Some(other) => {
            return Err(ConfigError::invalid(
                ENV_POLL_BACKOFF,
                format!("expected `fixed` or `exponential`, got `{other}`"),
            ));
        }
    };

    if let Some(n) = env_u32(get, ENV_POLL_MAX_ATTEMPTS)? {
        budget = budget.with_max_attempts(n);
    }
    if let Some(n) = env_u32(get, ENV_POLL_MAX_TRANSIENT_FAILURES)? {
        budget = budget.with_max_transient_failures(n);
    }
    Ok(budget)
}

fn parse_acceptance(
    states: Option<String>,
    at_or_beyond: Option<String>,
) -> Result<AcceptancePolicy, ConfigError> {
    match (states, at_or_beyond) {
        (Some(_), Some(_)) => Err(ConfigError::invalid(
            ENV_ACCEPT_AT_OR_BEYOND,
            format!("cannot be combined with {ENV_ACCEPT_STATES}"),
        )),
        (Some(list), None) => {
            let states = list
                .split(',')
                .map(|s| parse_state(ENV_ACCEPT_STATES, s))
                .collect::<Result<BTreeSet<_>, _>>()?;
            Ok(AcceptancePolicy::AnyOf(states))
        }
        (None, Some(threshold)) => Ok(AcceptancePolicy::AtOrBeyond(parse_state(
            ENV_ACCEPT_AT_OR_BEYOND,
            &threshold,
        )?)),
        (None, None) => Ok(AcceptancePolicy::default()),
    }
}

fn parse_state(name: &'static str, value: &str) -> Result<JobState, ConfigError> {
    match JobState::from_service_str(value) {
        JobState::Unknown => Err(ConfigError::invalid(name, format!("unknown job state `{}`", value.trim()))),
        state => Ok(state),
    }
}

fn env_u32(get: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<u32>, ConfigError> {
    get(name)
        .map(|v| v.parse::<u32>().map_err(|e| ConfigError::invalid(name, e.to_string())))
        .transpose()
}

fn env_secs(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    get(name)
        .map(|v| {
            v.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigError::invalid(name, e.to_string()))
        })
        .transpose()
}

/// Read [`JobDefaults`] from a YAML file.
pub fn load_job_defaults(path: impl AsRef<Path>) -> Result<JobDefaults, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_job_defaults(&text).map_err(|source| ConfigError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

pub fn parse_job_defaults(yaml: &str) -> Result<JobDefaults, serde_yaml::Error> {
    serde_yaml::from_str(yaml)
}
