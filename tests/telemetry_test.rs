//! Integration tests for telemetry initialization and span helpers.

use annotq::Error;
use annotq::telemetry::{TelemetryConfig, init_telemetry, work};

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process, so this may
    // return Err if another test got there first.
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "annotq-test".to_string(),
        log_level: "debug".to_string(),
    };
    let _guard = init_telemetry(config);
}

#[test]
fn request_span_records_outcome() {
    let span = work::start_request_span("get_or_assign_work", "batch-1", "ann");
    work::record_outcome(&span, "ok");
    work::record_duration("get_or_assign_work", std::time::Instant::now());
}

#[tokio::test]
async fn traced_passes_results_through() {
    let ok = work::traced("list_batches", "", "", async { Ok::<_, Error>(7) }).await;
    assert_eq!(ok.unwrap(), 7);

    let err = work::traced("record_decision", "batch-1", "ann", async {
        Err::<(), _>(Error::InvalidInput("label is required".to_string()))
    })
    .await;
    assert!(matches!(err, Err(Error::InvalidInput(_))));
}
