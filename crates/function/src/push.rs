//! Push delivery bodies.
//!
//! Two shapes are accepted:
//!
//! ```json
//! {"message": {"data": "<base64>", "messageId": "...", "attributes": {}}, "subscription": "..."}
//! {"data": "<base64>"}
//! ```
//!
//! Anything else becomes an envelope without a body, which the gate rejects
//! as malformed.

use std::collections::BTreeMap;

use serde::Deserialize;

use adpipe_events::EventEnvelope;

#[derive(Debug, Default, Deserialize)]
pub struct PushRequest {
    #[serde(default)]
    pub message: Option<PushMessage>,
    #[serde(default)]
    pub subscription: Option<String>,
    /// Bare background-event form.
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PushMessage {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, rename = "messageId", alias = "message_id")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl PushRequest {
    pub fn into_envelope(self) -> EventEnvelope {
        match self.message {
            Some(message) => {
                let mut envelope = EventEnvelope::new(message.data.map(String::into_bytes))
                    .with_attributes(message.attributes);
                if let Some(id) = message.message_id {
                    envelope = envelope.with_message_id(id);
                }
                envelope
            }
            None => EventEnvelope::new(self.data.map(String::into_bytes)),
        }
    }
}

/// Parse a raw request body into an envelope. Never fails.
pub fn envelope_from_body(body: &[u8]) -> EventEnvelope {
    match serde_json::from_slice::<PushRequest>(body) {
        Ok(request) => request.into_envelope(),
        Err(e) => {
            tracing::debug!(error = %e, "push body is not a recognised delivery");
            EventEnvelope::empty()
        }
    }
}
