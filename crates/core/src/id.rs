//! Strongly-typed identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Identifier of one controller run (one event delivery).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered) so invocation ids sort by arrival in logs.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for InvocationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("InvocationId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Identifier of an adaptive pipeline, as carried by inbound events.
///
/// Opaque to this system; only non-emptiness is enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PipelineId(String);

impl PipelineId {
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("pipeline_id must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PipelineId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PipelineId> for String {
    fn from(value: PipelineId) -> Self {
        value.0
    }
}

impl FromStr for PipelineId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_id_trims_and_rejects_blank() {
        assert_eq!(PipelineId::new("  p-1 ").unwrap().as_str(), "p-1");
        assert!(matches!(
            PipelineId::new("   "),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn pipeline_id_deserializes_through_validation() {
        let ok: PipelineId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(ok.as_str(), "abc");
        assert!(serde_json::from_str::<PipelineId>("\"\"").is_err());
    }

    #[test]
    fn invocation_id_round_trips_through_display() {
        let id = InvocationId::new();
        let parsed: InvocationId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!(matches!(
            "not-a-uuid".parse::<InvocationId>(),
            Err(DomainError::InvalidId(_))
        ));
    }
}
