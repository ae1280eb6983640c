use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── Booking decisions ───────────────────────────────────────────

/// Counter: pending bookings created.
pub const BOOKINGS_REQUESTED_TOTAL: &str = "roombook_bookings_requested_total";

/// Counter: overlaps found by the conflict check. Labels: tier (hard, soft).
pub const BOOKING_CONFLICTS_TOTAL: &str = "roombook_booking_conflicts_total";

/// Counter: status transitions applied. Labels: status.
pub const BOOKING_DECISIONS_TOTAL: &str = "roombook_booking_decisions_total";

/// Counter: repository calls abandoned after the configured timeout. Labels: op.
pub const REPOSITORY_TIMEOUTS_TOTAL: &str = "roombook_repository_timeouts_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roombook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roombook_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
