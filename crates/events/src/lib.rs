//! Inbound event envelopes, message gating, and outbound publishing.
//!
//! - `envelope`: transport payload as delivered (base64 text, not yet decoded)
//! - `command`: typed intent extracted from an envelope
//! - `gate`: the decode/validate step that separates wanted from unwanted events
//! - `publish`: outbound publish capability (topic + JSON message)

pub mod command;
pub mod envelope;
pub mod gate;
pub mod publish;

pub use command::{Command, MessageType, GENERATE_NEW_MODEL};
pub use envelope::{BodyEncoding, EventEnvelope};
pub use gate::{MessageGate, Rejection};
pub use publish::{InMemoryPublisher, PublishError, Publisher};
