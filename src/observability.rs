use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: outcome.
pub const RESERVATIONS_TOTAL: &str = "airtime_reservations_total";

/// Histogram: end-to-end booking latency in seconds.
pub const RESERVATION_DURATION_SECONDS: &str = "airtime_reservation_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting for slot locks, in seconds.
pub const SLOT_LOCK_WAIT_SECONDS: &str = "airtime_slot_lock_wait_seconds";

/// Gauge: livestreams in the catalog.
pub const LIVESTREAMS: &str = "airtime_livestreams";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "airtime_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "airtime_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "airtime_wal_compactions_total";

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

/// Outcome label for a booking result.
pub fn outcome_label<T>(result: &Result<T, crate::engine::EngineError>) -> &'static str {
    match result {
        Ok(_) => "reserved",
        Err(e) => e.kind(),
    }
}
