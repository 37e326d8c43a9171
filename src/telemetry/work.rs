//! Request span helpers.
//!
//! Every coordinator operation runs inside one span carrying the batch and
//! user it acts for.

use std::future::Future;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Instrument, Span};

use super::metrics;
use crate::error::Result;

/// Start a span for one engine request.
///
/// The `annotq.outcome` field is declared empty and filled by
/// [`record_outcome`].
pub fn start_request_span(operation: &'static str, batch_id: &str, user_id: &str) -> Span {
    tracing::info_span!(
        "annotq.request",
        "annotq.operation" = operation,
        "annotq.batch_id" = batch_id,
        "annotq.user_id" = user_id,
        "annotq.outcome" = tracing::field::Empty,
    )
}

/// Record how a request ended, on its span.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("annotq.outcome", outcome);
}

/// Record elapsed wall time for an operation.
pub fn record_duration(operation: &'static str, started: Instant) {
    metrics::operation_duration_ms().record(
        started.elapsed().as_secs_f64() * 1000.0,
        &[KeyValue::new("operation", operation)],
    );
}

/// Run one request inside its span, recording outcome and duration.
pub async fn traced<T>(
    operation: &'static str,
    batch_id: &str,
    user_id: &str,
    request: impl Future<Output = Result<T>>,
) -> Result<T> {
    let span = start_request_span(operation, batch_id, user_id);
    let started = Instant::now();
    let result = request.instrument(span.clone()).await;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) if e.is_retryable() => "retryable_error",
        Err(_) => "rejected",
    };
    record_outcome(&span, outcome);
    record_duration(operation, started);
    result
}
