use tracing::{Level, Span, field};

use super::TraceId;

/// Create a root span for one lifecycle operation (login, initialize, ...).
///
/// `user_id` starts empty and is filled in with [`Span::record`] once known.
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::span!(
        Level::INFO,
        "session_op",
        op = name,
        trace_id = %trace_id,
        user_id = field::Empty
    )
}

/// Create a child span (inherits trace_id automatically)
pub fn child_span(name: &'static str) -> Span {
    tracing::span!(Level::INFO, "session_step", step = name)
}
