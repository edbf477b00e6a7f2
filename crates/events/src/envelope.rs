use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Encoding of an envelope body. Only one is supported on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyEncoding {
    /// Base64 text wrapping a UTF-8 JSON document.
    Base64Json,
}

/// Envelope for one inbound event delivery.
///
/// Notes:
/// - `raw_body` holds the body exactly as delivered (base64 text bytes); decoding
///   is the gate's job, not the transport's.
/// - Constructed once per delivery and consumed once; never persisted.
/// - `message_id` and `attributes` are transport metadata used only for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventEnvelope {
    raw_body: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
}

impl EventEnvelope {
    pub fn new(raw_body: Option<Vec<u8>>) -> Self {
        Self {
            raw_body,
            message_id: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Envelope without a body (what the transport hands over for an empty delivery).
    pub fn empty() -> Self {
        Self::new(None)
    }

    /// Envelope from the base64 text field of a delivery.
    pub fn from_base64_text(text: impl Into<String>) -> Self {
        Self::new(Some(text.into().into_bytes()))
    }

    /// Encode a JSON document the way producers do (JSON → UTF-8 → base64).
    pub fn encode_json(document: &serde_json::Value) -> Self {
        Self::from_base64_text(STANDARD.encode(document.to_string()))
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn raw_body(&self) -> Option<&[u8]> {
        self.raw_body.as_deref()
    }

    pub fn encoding(&self) -> BodyEncoding {
        BodyEncoding::Base64Json
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}
