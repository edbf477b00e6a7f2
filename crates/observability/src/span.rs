use tracing::{Span, field, info_span};

use adpipe_core::InvocationId;

/// Root span for one event invocation.
///
/// `pipeline_id` starts empty; it is recorded once the event has been
/// validated (`Span::current().record("pipeline_id", ..)`). `slot` records
/// how a fixed-name slot was cleared before submission.
pub fn invocation_span(invocation_id: &InvocationId, message_id: Option<&str>) -> Span {
    info_span!(
        "invocation",
        invocation_id = %invocation_id,
        message_id = message_id.unwrap_or(""),
        pipeline_id = field::Empty,
        slot = field::Empty,
    )
}
