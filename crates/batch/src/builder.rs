//! Job specification builder.
//!
//! `build` is pure and total: any well-typed parameters produce a spec.
//! Everything not supplied by the caller comes from [`JobDefaults`], which
//! deployments override through configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::{ComputeResources, JobSpec, LogsDestination};

/// Longest job id the service accepts.
pub const MAX_JOB_ID_LEN: usize = 63;

/// Placeholder expanded by [`render_name`].
pub const PIPELINE_ID_PLACEHOLDER: &str = "{pipeline_id}";

/// Deployment-level defaults applied to every spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobDefaults {
    #[serde(rename = "max_run_duration_secs", with = "duration_secs")]
    pub max_run_duration: Duration,
    pub task_count: u32,
    pub parallelism: u32,
    pub resources: ComputeResources,
    pub max_retry_count: u32,
    pub commands: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub allocation_policy: Option<Value>,
    pub logs_destination: LogsDestination,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            max_run_duration: Duration::from_secs(60 * 60),
            task_count: 1,
            parallelism: 1,
            resources: ComputeResources::default(),
            max_retry_count: 0,
            commands: Vec::new(),
            environment: BTreeMap::new(),
            labels: BTreeMap::new(),
            allocation_policy: None,
            logs_destination: LogsDestination::CloudLogging,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Per-invocation parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobParams {
    pub logical_name: String,
    pub container_image: String,
    pub commands: Option<Vec<String>>,
    pub max_run_duration: Option<Duration>,
    pub resources: Option<ComputeResources>,
    pub environment: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl JobParams {
    pub fn new(logical_name: impl Into<String>, container_image: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            container_image: container_image.into(),
            ..Default::default()
        }
    }

    pub fn with_commands(mut self, commands: Vec<String>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn with_max_run_duration(mut self, duration: Duration) -> Self {
        self.max_run_duration = Some(duration);
        self
    }

    pub fn with_resources(mut self, resources: ComputeResources) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobSpecBuilder {
    defaults: JobDefaults,
}

impl JobSpecBuilder {
    pub fn new(defaults: JobDefaults) -> Self {
        Self { defaults }
    }

    pub fn build(&self, params: JobParams) -> JobSpec {
        let d = &self.defaults;

        // Zero counts are meaningless to the service; parallelism never exceeds tasks.
        let task_count = d.task_count.max(1);
        let parallelism = d.parallelism.clamp(1, task_count);

        let mut environment = d.environment.clone();
        environment.extend(params.environment);
        let mut labels = d.labels.clone();
        labels.extend(params.labels);

        JobSpec {
            logical_name: params.logical_name,
            container_image: params.container_image,
            commands: params.commands.unwrap_or_else(|| d.commands.clone()),
            max_run_duration: params.max_run_duration.unwrap_or(d.max_run_duration),
            task_count,
            parallelism,
            resources: params.resources.unwrap_or(d.resources),
            max_retry_count: d.max_retry_count,
            environment,
            labels,
            allocation_policy: d.allocation_policy.clone(),
            logs_destination: d.logs_destination.clone(),
        }
    }
}

/// Hex characters of the pipeline digest appended to templated names.
pub const PIPELINE_DIGEST_LEN: usize = 12;

/// Expand a job-name template for a pipeline and coerce it into a valid job id.
///
/// Job ids are lowercase letters, digits, and hyphens, start with a letter,
/// end with a letter or digit, and are at most 63 characters.
///
/// Sanitising is lossy (`Alpha_1` and `alpha.1` read the same), so when the
/// template mentions `{pipeline_id}` the name ends with a digest of the raw
/// id: `{readable prefix}-{hex(sha256(pipeline_id))[..12]}`. Distinct
/// pipelines never share a slot. A template without the placeholder names
/// one slot shared by every pipeline. A blank template (or one that
/// sanitises to nothing) yields an empty name, which requests a
/// service-generated id.
pub fn render_name(template: &str, pipeline_id: &str) -> String {
    let template = template.trim();
    if !template.contains(PIPELINE_ID_PLACEHOLDER) {
        let mut name = sanitize_job_id(template);
        name.truncate(MAX_JOB_ID_LEN);
        return name.trim_end_matches('-').to_string();
    }

    let mut prefix = sanitize_job_id(&template.replace(PIPELINE_ID_PLACEHOLDER, pipeline_id));
    if prefix.is_empty() {
        prefix.push('j');
    }
    prefix.truncate(MAX_JOB_ID_LEN - PIPELINE_DIGEST_LEN - 1);
    format!("{}-{}", prefix.trim_end_matches('-'), pipeline_digest(pipeline_id))
}

fn pipeline_digest(pipeline_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pipeline_id.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(PIPELINE_DIGEST_LEN);
    digest
}

/// Lowercase, fold non-alphanumeric runs into `-`, and make sure the result
/// starts with a letter. Not truncated.
fn sanitize_job_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }

    let mut name = out.trim_end_matches('-').to_string();
    if !name.is_empty() && !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        name.insert_str(0, "j-");
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_apply_when_params_are_minimal() {
        let spec = JobSpecBuilder::default().build(JobParams::new("train", "gcr.io/x/y:1"));
        assert_eq!(spec.logical_name, "train");
        assert_eq!(spec.container_image, "gcr.io/x/y:1");
        assert_eq!(spec.max_run_duration, Duration::from_secs(3600));
        assert_eq!(spec.task_count, 1);
        assert_eq!(spec.parallelism, 1);
        assert!(spec.commands.is_empty());
        assert_eq!(spec.logs_destination, LogsDestination::CloudLogging);
        assert!(spec.allocation_policy.is_none());
    }

    #[test]
    fn params_override_defaults_and_maps_merge() {
        let defaults = JobDefaults {
            commands: vec!["python".into(), "main.py".into()],
            environment: BTreeMap::from([("MODE".into(), "batch".into()), ("A".into(), "1".into())]),
            task_count: 4,
            parallelism: 8,
            ..JobDefaults::default()
        };
        let spec = JobSpecBuilder::new(defaults).build(
            JobParams::new("", "img")
                .with_commands(vec!["run".into()])
                .with_max_run_duration(Duration::from_secs(60))
                .with_resources(ComputeResources {
                    cpu_milli: 500,
                    memory_mib: 512,
                })
                .with_env("A", "2")
                .with_label("pipeline_id", "p1"),
        );

        assert!(spec.requests_generated_id());
        assert_eq!(spec.commands, vec!["run".to_string()]);
        assert_eq!(spec.max_run_duration, Duration::from_secs(60));
        assert_eq!((spec.resources.cpu_milli, spec.resources.memory_mib), (500, 512));
        assert_eq!(spec.environment.get("MODE").map(String::as_str), Some("batch"));
        assert_eq!(spec.environment.get("A").map(String::as_str), Some("2"));
        assert_eq!(spec.labels.get("pipeline_id").map(String::as_str), Some("p1"));
        assert_eq!(spec.task_count, 4);
        assert_eq!(spec.parallelism, 4);
    }

    #[test]
    fn zero_counts_are_clamped() {
        let defaults = JobDefaults {
            task_count: 0,
            parallelism: 0,
            ..JobDefaults::default()
        };
        let spec = JobSpecBuilder::new(defaults).build(JobParams::new("n", "i"));
        assert_eq!((spec.task_count, spec.parallelism), (1, 1));
    }

    #[test]
    fn defaults_deserialize_with_partial_fields() {
        let d: JobDefaults =
            serde_json::from_str(r#"{"max_run_duration_secs": 900, "resources": {"cpu_milli": 4000}}"#)
                .unwrap();
        assert_eq!(d.max_run_duration, Duration::from_secs(900));
        assert_eq!(d.resources.cpu_milli, 4000);
        assert_eq!(d.resources.memory_mib, ComputeResources::default().memory_mib);
        assert_eq!(d.task_count, 1);

        assert!(serde_json::from_str::<JobDefaults>(r#"{"bogus": 1}"#).is_err());
    }

    fn digest_of(pipeline_id: &str) -> String {
        let name = render_name("{pipeline_id}", pipeline_id);
        name[name.len() - PIPELINE_DIGEST_LEN..].to_string()
    }

    #[test]
    fn render_name_expands_and_sanitises() {
        let d = digest_of("Pl_42");
        assert_eq!(d.len(), PIPELINE_DIGEST_LEN);
        assert_eq!(render_name("model-train-{pipeline_id}", "Pl_42"), format!("model-train-pl-42-{d}"));
        assert_eq!(render_name("{pipeline_id}", "7abc"), format!("j-7abc-{}", digest_of("7abc")));
        assert_eq!(render_name("{pipeline_id}", "__"), format!("j-{}", digest_of("__")));
        assert_eq!(render_name("fixed", "ignored"), "fixed");
        assert_eq!(render_name("", "p"), "");
        assert_eq!(render_name("  ", "p"), "");
        assert_eq!(render_name("__", "p"), "");
        assert_eq!(render_name("a--b__c", "p"), "a-b-c");
    }

    #[test]
    fn ids_that_sanitise_alike_get_distinct_slots() {
        let a = render_name("adaptive-pipeline-{pipeline_id}", "Alpha_1");
        let b = render_name("adaptive-pipeline-{pipeline_id}", "alpha.1");
        assert!(a.starts_with("adaptive-pipeline-alpha-1-"));
        assert!(b.starts_with("adaptive-pipeline-alpha-1-"));
        assert_ne!(a, b);
        assert_eq!(a, render_name("adaptive-pipeline-{pipeline_id}", "Alpha_1"));
    }

    #[test]
    fn long_ids_keep_the_digest() {
        let long = "x".repeat(200);
        let name = render_name("adaptive-pipeline-{pipeline_id}", &long);
        assert_eq!(name.len(), MAX_JOB_ID_LEN);
        assert!(name.ends_with(&digest_of(&long)));
        assert_ne!(name, render_name("adaptive-pipeline-{pipeline_id}", &"x".repeat(199)));
    }

    fn assert_valid_job_id(name: &str) -> Result<(), TestCaseError> {
        prop_assert!(name.len() <= MAX_JOB_ID_LEN);
        prop_assert!(name.starts_with(|c: char| c.is_ascii_lowercase()));
        prop_assert!(!name.ends_with('-'));
        prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        Ok(())
    }

    proptest! {
        /// Property: rendered names are empty or valid job ids.
        #[test]
        fn rendered_names_are_valid_job_ids(template in ".{0,40}", pipeline in ".{0,80}") {
            let name = render_name(&template, &pipeline);
            if !name.is_empty() {
                assert_valid_job_id(&name)?;
            }
        }

        /// Property: distinct pipeline ids never share a templated slot.
        #[test]
        fn distinct_pipelines_get_distinct_names(
            template in "[a-z_.-]{0,20}",
            a in ".{1,80}",
            b in ".{1,80}",
        ) {
            prop_assume!(a != b);
            let template = format!("{template}{PIPELINE_ID_PLACEHOLDER}");
            let (na, nb) = (render_name(&template, &a), render_name(&template, &b));
            assert_valid_job_id(&na)?;
            assert_valid_job_id(&nb)?;
            prop_assert_ne!(na, nb);
        }
    }
}
