//! Tracing setup and per-invocation spans.

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filters, layers).
pub mod tracing;

/// Spans shared by the components of one invocation.
pub mod span;

pub use span::invocation_span;
