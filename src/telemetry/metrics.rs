//! Metric instrument factories for annotq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! With no provider installed the instruments are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("annotq")
}

/// Counter: unit claim attempts.
/// Labels: `result` ("granted" | "stolen" | "resumed" | "exhausted").
pub fn claims() -> Counter<u64> {
    meter()
        .u64_counter("annotq.claims")
        .with_description("Unit claim attempts by result")
        .build()
}

/// Counter: claims released back to the pool.
/// Labels: `result` ("released" | "stale").
pub fn claims_released() -> Counter<u64> {
    meter()
        .u64_counter("annotq.claims.released")
        .with_description("Unit claim releases")
        .build()
}

/// Counter: section requests.
/// Labels: `result` ("assigned" | "resumed" | "exhausted" | "conflict_retry").
pub fn sections() -> Counter<u64> {
    meter()
        .u64_counter("annotq.sections")
        .with_description("Section assignment requests by result")
        .build()
}

/// Counter: annotations recorded.
/// Labels: `label`.
pub fn annotations_recorded() -> Counter<u64> {
    meter()
        .u64_counter("annotq.annotations.recorded")
        .with_description("Annotations recorded")
        .build()
}

/// Counter: progress index writes.
/// Labels: `kind` ("decision" | "skip").
pub fn progress_advances() -> Counter<u64> {
    meter()
        .u64_counter("annotq.progress.advances")
        .with_description("Section progress updates")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("annotq.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
