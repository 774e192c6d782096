use std::net::SocketAddr;

use crate::engine::EngineError;

// ── Request metrics ─────────────────────────────────────────────

/// Counter: availability queries served. Labels: verified.
pub const SLOT_QUERIES_TOTAL: &str = "studiobook_slot_queries_total";

/// Histogram: availability query latency in seconds.
pub const SLOT_QUERY_DURATION_SECONDS: &str = "studiobook_slot_query_duration_seconds";

/// Counter: commit-time availability checks. Labels: outcome.
pub const REVALIDATIONS_TOTAL: &str = "studiobook_revalidations_total";

/// Counter: bookings moved into a status. Labels: status.
pub const BOOKINGS_TOTAL: &str = "studiobook_bookings_total";

// ── Collaborator failures ───────────────────────────────────────

/// Counter: failed calendar calls. Labels: op.
pub const CALENDAR_FAILURES_TOTAL: &str = "studiobook_calendar_failures_total";

/// Counter: bookings whose calendar event exists but whose store write failed.
pub const PERSISTENCE_FAILURES_TOTAL: &str = "studiobook_persistence_failures_total";

/// Counter: linked extra-resource events that could not be written.
pub const LINKED_EVENT_FAILURES_TOTAL: &str = "studiobook_linked_event_failures_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a revalidation result to a short label for metrics.
pub fn revalidation_label(result: &Result<(), EngineError>) -> &'static str {
    match result {
        Ok(()) => "ok",
        Err(EngineError::SlotConflict(_)) => "conflict",
        Err(EngineError::MalformedSelection(_)) => "malformed",
        Err(EngineError::BookingUnconfirmable(_)) => "unconfirmable",
        Err(_) => "error",
    }
}
