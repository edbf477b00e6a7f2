//! Message gate: decode an envelope and decide whether it is actionable.
//!
//! Decoding pipeline: body bytes → base64 → UTF-8 → JSON object → `status`
//! discriminator → (for the accepted type) `pipeline_id`.
//!
//! The gate never fails outward: every input maps to either a [`Command`] or a
//! [`Rejection`]. Malformed input and well-formed-but-uninteresting input are
//! kept apart so callers can log them differently.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use adpipe_core::PipelineId;

use crate::command::{Command, MessageType};
use crate::envelope::EventEnvelope;

/// Field carrying the message-type code.
pub const DISCRIMINATOR_FIELD: &str = "status";

/// Field carrying the pipeline id for model-generation messages.
pub const PIPELINE_ID_FIELD: &str = "pipeline_id";

/// Why an envelope was not turned into a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("envelope has no body")]
    MissingBody,

    #[error("body is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("decoded body is not valid UTF-8")]
    InvalidUtf8,

    #[error("decoded body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("decoded body is not a JSON object")]
    NotAnObject,

    #[error("decoded body has no `status` field")]
    MissingDiscriminator,

    #[error("`status` field is not an integer")]
    InvalidDiscriminator,

    #[error("required field `{0}` is missing or invalid")]
    MissingField(&'static str),

    /// Well-formed message of a type this system does not act upon.
    #[error("message type {status} is not applicable")]
    NotApplicable { status: i64 },
}

impl Rejection {
    /// True for bad input; false for the "not applicable" drop.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Rejection::NotApplicable { .. })
    }

    /// Stable short code for logs and responses.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Rejection::MissingBody => "missing_body",
            Rejection::InvalidEncoding(_) => "invalid_encoding",
            Rejection::InvalidUtf8 => "invalid_utf8",
            Rejection::InvalidJson(_) => "invalid_json",
            Rejection::NotAnObject => "not_an_object",
            Rejection::MissingDiscriminator => "missing_discriminator",
            Rejection::InvalidDiscriminator => "invalid_discriminator",
            Rejection::MissingField(_) => "missing_field",
            Rejection::NotApplicable { .. } => "not_applicable",
        }
    }
}

/// Validates inbound envelopes against one accepted message type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MessageGate {
    accepted: MessageType,
}

impl Default for MessageGate {
    fn default() -> Self {
        Self::new(MessageType::GenerateNewModel)
    }
}

impl MessageGate {
    pub fn new(accepted: MessageType) -> Self {
        Self { accepted }
    }

    pub fn accepted(&self) -> MessageType {
        self.accepted
    }

    /// Decode and validate an envelope.
    ///
    /// Pure apart from debug logging.
    pub fn validate(&self, envelope: &EventEnvelope) -> Result<Command, Rejection> {
        let result = self.decode(envelope);
        match &result {
            Ok(cmd) => debug!(
                message_id = envelope.message_id(),
                pipeline_id = %cmd.pipeline_id(),
                "event accepted"
            ),
            Err(rejection) => debug!(
                message_id = envelope.message_id(),
                reason = rejection.reason_code(),
                malformed = rejection.is_malformed(),
                detail = %rejection,
                "event rejected"
            ),
        }
        result
    }

    fn decode(&self, envelope: &EventEnvelope) -> Result<Command, Rejection> {
        let raw = envelope.raw_body().ok_or(Rejection::MissingBody)?;
        let raw = raw.trim_ascii();
        if raw.is_empty() {
            return Err(Rejection::MissingBody);
        }

        let bytes = STANDARD
            .decode(raw)
            .map_err(|e| Rejection::InvalidEncoding(e.to_string()))?;
        let text = String::from_utf8(bytes).map_err(|_| Rejection::InvalidUtf8)?;

        let document: Value =
            serde_json::from_str(&text).map_err(|e| Rejection::InvalidJson(e.to_string()))?;
        let Value::Object(payload) = document else {
            return Err(Rejection::NotAnObject);
        };

        let status = payload
            .get(DISCRIMINATOR_FIELD)
            .ok_or(Rejection::MissingDiscriminator)
            .and_then(|v| integral_code(v).ok_or(Rejection::InvalidDiscriminator))?;

        let kind = MessageType::from_code(status);
        if kind != self.accepted {
            return Err(Rejection::NotApplicable { status });
        }

        let pipeline_id = payload
            .get(PIPELINE_ID_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| PipelineId::new(s).ok())
            .ok_or(Rejection::MissingField(PIPELINE_ID_FIELD))?;

        Ok(Command::new(kind, pipeline_id, payload))
    }
}

/// Integer value of a discriminator. Integral floats (`5.0`) count as their
/// integer; fractional values and non-numbers do not.
fn integral_code(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(f))
            .map(|f| f as i64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::GENERATE_NEW_MODEL;
    use proptest::prelude::*;
    use serde_json::json;

    fn gate() -> MessageGate {
        MessageGate::default()
    }

    #[test]
    fn accepts_generate_new_model_with_pipeline_id() {
        let env = EventEnvelope::encode_json(&json!({"status": 5, "pipeline_id": "pl-42"}));
        let cmd = gate().validate(&env).unwrap();
        assert_eq!(cmd.kind(), MessageType::GenerateNewModel);
        assert_eq!(cmd.pipeline_id().as_str(), "pl-42");
        assert_eq!(cmd.payload().get("status"), Some(&json!(5)));
    }

    #[test]
    fn surrounding_whitespace_in_body_is_tolerated() {
        let env = EventEnvelope::encode_json(&json!({"status": 5, "pipeline_id": "p"}));
        let padded = format!("  {}\n", String::from_utf8(env.raw_body().unwrap().to_vec()).unwrap());
        assert!(gate().validate(&EventEnvelope::from_base64_text(padded)).is_ok());
    }

    #[test]
    fn missing_and_blank_body_are_malformed() {
        assert_eq!(gate().validate(&EventEnvelope::empty()), Err(Rejection::MissingBody));
        assert_eq!(
            gate().validate(&EventEnvelope::from_base64_text("   ")),
            Err(Rejection::MissingBody)
        );
    }

    #[test]
    fn each_decoding_stage_has_its_own_reason() {
        let g = gate();

        let bad_b64 = EventEnvelope::from_base64_text("%%%not base64%%%");
        assert!(matches!(g.validate(&bad_b64), Err(Rejection::InvalidEncoding(_))));

        let bad_utf8 = EventEnvelope::from_base64_text(STANDARD.encode([0xff, 0xfe, 0xfd]));
        assert_eq!(g.validate(&bad_utf8), Err(Rejection::InvalidUtf8));

        let bad_json = EventEnvelope::from_base64_text(STANDARD.encode("{status: 5"));
        assert!(matches!(g.validate(&bad_json), Err(Rejection::InvalidJson(_))));

        let array = EventEnvelope::encode_json(&json!([5]));
        assert_eq!(g.validate(&array), Err(Rejection::NotAnObject));

        let no_status = EventEnvelope::encode_json(&json!({"pipeline_id": "p"}));
        assert_eq!(g.validate(&no_status), Err(Rejection::MissingDiscriminator));

        let string_status = EventEnvelope::encode_json(&json!({"status": "5", "pipeline_id": "p"}));
        assert_eq!(g.validate(&string_status), Err(Rejection::InvalidDiscriminator));

        let fractional = EventEnvelope::encode_json(&json!({"status": 5.5, "pipeline_id": "p"}));
        assert_eq!(g.validate(&fractional), Err(Rejection::InvalidDiscriminator));

        let no_pipeline = EventEnvelope::encode_json(&json!({"status": 5}));
        assert_eq!(g.validate(&no_pipeline), Err(Rejection::MissingField(PIPELINE_ID_FIELD)));
    }

    #[test]
    fn integral_float_status_matches_its_integer() {
        let env = EventEnvelope::encode_json(&json!({"status": 5.0, "pipeline_id": "p"}));
        assert_eq!(gate().validate(&env).unwrap().pipeline_id().as_str(), "p");

        let env = EventEnvelope::encode_json(&json!({"status": 3.0, "pipeline_id": "p"}));
        assert_eq!(gate().validate(&env), Err(Rejection::NotApplicable { status: 3 }));
    }

    #[test]
    fn not_applicable_is_distinct_from_malformed() {
        let env = EventEnvelope::encode_json(&json!({"status": 3, "pipeline_id": "p"}));
        let rejection = gate().validate(&env).unwrap_err();
        assert_eq!(rejection, Rejection::NotApplicable { status: 3 });
        assert!(!rejection.is_malformed());
        assert_eq!(rejection.reason_code(), "not_applicable");

        assert!(Rejection::MissingBody.is_malformed());
        assert!(Rejection::MissingDiscriminator.is_malformed());
    }

    #[test]
    fn other_status_without_pipeline_id_is_still_not_applicable() {
        let env = EventEnvelope::encode_json(&json!({"status": 1}));
        assert_eq!(gate().validate(&env), Err(Rejection::NotApplicable { status: 1 }));
    }

    #[test]
    fn gate_can_accept_a_different_code() {
        let g = MessageGate::new(MessageType::Other(7));
        let env = EventEnvelope::encode_json(&json!({"status": 7, "pipeline_id": "p"}));
        assert_eq!(g.validate(&env).unwrap().kind(), MessageType::Other(7));

        let env = EventEnvelope::encode_json(&json!({"status": 5, "pipeline_id": "p"}));
        assert_eq!(g.validate(&env), Err(Rejection::NotApplicable { status: 5 }));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: every decodable event whose status differs from the accepted
        /// code is rejected as not applicable.
        #[test]
        fn non_matching_status_is_never_accepted(
            status in any::<i64>().prop_filter("must differ", |s| *s != GENERATE_NEW_MODEL),
            pipeline in "[a-z0-9-]{1,16}",
        ) {
            let env = EventEnvelope::encode_json(&json!({"status": status, "pipeline_id": pipeline}));
            prop_assert_eq!(gate().validate(&env), Err(Rejection::NotApplicable { status }));
        }

        /// Property: bodies containing characters outside the base64 alphabet are
        /// malformed, never accepted.
        #[test]
        fn non_base64_bodies_are_malformed(prefix in "[A-Za-z0-9]{0,12}", junk in "[!@#$%^&*(){}]{1,4}") {
            let env = EventEnvelope::from_base64_text(format!("{prefix}{junk}"));
            let rejection = gate().validate(&env).unwrap_err();
            prop_assert!(rejection.is_malformed());
        }
    }
}
