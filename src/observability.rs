use std::net::SocketAddr;

// ── Booking traffic ─────────────────────────────────────────────

/// Counter: bookings admitted (ordinary and instant).
pub const BOOKINGS_ADMITTED_TOTAL: &str = "roombook_bookings_admitted_total";

/// Counter: bookings cancelled.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "roombook_bookings_cancelled_total";

/// Counter: rejected requests. Labels: op, reason.
pub const REQUESTS_REJECTED_TOTAL: &str = "roombook_requests_rejected_total";

// ── Auto-release ────────────────────────────────────────────────

/// Counter: status changes published by the scheduler.
pub const STATUS_TRANSITIONS_TOTAL: &str = "roombook_status_transitions_total";

/// Histogram: scheduler pass duration in seconds.
pub const SCHEDULER_TICK_DURATION_SECONDS: &str = "roombook_scheduler_tick_duration_seconds";

/// Gauge: rooms held by the engine.
pub const ROOMS_ACTIVE: &str = "roombook_rooms_active";

// ── Persistence ─────────────────────────────────────────────────

/// Histogram: snapshot save duration in seconds.
pub const SNAPSHOT_SAVE_DURATION_SECONDS: &str = "roombook_snapshot_save_duration_seconds";

/// Counter: snapshot saves that failed.
pub const SNAPSHOT_SAVE_FAILURES_TOTAL: &str = "roombook_snapshot_save_failures_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
