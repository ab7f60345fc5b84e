use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: assignment mutations. Labels: op (create|update|delete), status (ok or error label).
pub const MUTATIONS_TOTAL: &str = "classgrid_mutations_total";

/// Histogram: mutation latency in seconds, lock waits included. Labels: op.
pub const MUTATION_DURATION_SECONDS: &str = "classgrid_mutation_duration_seconds";

/// Counter: colliding assignments reported by rejected mutations. Labels: kind (instructor|room).
pub const CONFLICTS_TOTAL: &str = "classgrid_conflicts_total";

// ── State ───────────────────────────────────────────────────────

/// Counter: rooms created on first use of a label.
pub const ROOMS_CREATED_TOTAL: &str = "classgrid_rooms_created_total";

/// Gauge: committed assignments.
pub const ASSIGNMENTS_ACTIVE: &str = "classgrid_assignments_active";

// ── WAL ─────────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "classgrid_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "classgrid_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "classgrid_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
pub fn init(port: Option<u16>) -> anyhow::Result<()> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
