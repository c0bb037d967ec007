use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "parkd_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "parkd_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "parkd_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "parkd_connections_total";

/// Counter: connections rejected due to limit or peer filtering.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "parkd_connections_rejected_total";

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "parkd_tenants_active";

/// Counter: sessions transitioned to expired by the sweeper.
pub const SESSIONS_EXPIRED_TOTAL: &str = "parkd_sessions_expired_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "parkd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "parkd_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertSpot { .. } => "insert_spot",
        Command::SetAvailability { .. } => "set_availability",
        Command::DeactivateSpot { .. } => "deactivate_spot",
        Command::InsertSession { .. } => "insert_session",
        Command::ExtendSession { .. } => "extend_session",
        Command::CancelSession { .. } => "cancel_session",
        Command::InsertPayment { .. } => "insert_payment",
        Command::ConfirmCharge { .. } => "confirm_charge",
        Command::FailCharge { .. } => "fail_charge",
        Command::RefundPayment { .. } => "refund_payment",
        Command::SelectSpots { .. } => "select_spots",
        Command::SelectSpot { .. } => "select_spot",
        Command::SelectActiveSession { .. } => "select_active_session",
        Command::SelectSession { .. } => "select_session",
        Command::SelectSessionHistory { .. } => "select_session_history",
        Command::SelectPayments { .. } => "select_payments",
        Command::SelectPayment { .. } => "select_payment",
        Command::SelectPaymentByChargeRef { .. } => "select_payment_by_charge_ref",
        Command::SelectStats => "select_stats",
        Command::SelectPlateStats { .. } => "select_plate_stats",
    }
}
