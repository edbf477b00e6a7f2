use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use adpipe_core::PipelineId;

/// Message-type code that requests a new model to be generated for a pipeline.
pub const GENERATE_NEW_MODEL: i64 = 5;

/// Message-type discriminator carried in the `status` field of an event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum MessageType {
    GenerateNewModel,
    /// Any code this system does not act upon.
    Other(i64),
}

impl MessageType {
    pub fn from_code(code: i64) -> Self {
        match code {
            GENERATE_NEW_MODEL => Self::GenerateNewModel,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::GenerateNewModel => GENERATE_NEW_MODEL,
            Self::Other(code) => code,
        }
    }
}

impl From<i64> for MessageType {
    fn from(value: i64) -> Self {
        Self::from_code(value)
    }
}

impl From<MessageType> for i64 {
    fn from(value: MessageType) -> Self {
        value.code()
    }
}

/// Typed intent extracted from an event envelope by the gate.
///
/// Commands are transient: they exist for one invocation and are never stored.
/// Only the gate constructs them, so a `Command` always carries a valid pipeline id.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    kind: MessageType,
    pipeline_id: PipelineId,
    payload: Map<String, Value>,
}

impl Command {
    pub(crate) fn new(kind: MessageType, pipeline_id: PipelineId, payload: Map<String, Value>) -> Self {
        Self {
            kind,
            pipeline_id,
            payload,
        }
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn pipeline_id(&self) -> &PipelineId {
        &self.pipeline_id
    }

    /// The full decoded document (including `status` and `pipeline_id`).
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}
