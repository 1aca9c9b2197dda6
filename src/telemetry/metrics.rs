//! Prometheus metrics exporter and metric name registry
//!
//! Risk components emit through the `metrics` macros; this module owns the
//! exporter and pre-registers descriptions so the scrape endpoint is
//! self-documenting.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on the given port
pub fn install_exporter(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;

    describe_counter!("risk_events_total", "Risk events recorded");
    describe_counter!("risk_notifications_total", "Risk notifications delivered");
    describe_counter!("risk_shutdowns_total", "Emergency shutdowns triggered");
    describe_counter!(
        "risk_checks_rejected_total",
        "Trade proposals rejected by the risk gate"
    );
    describe_gauge!("risk_daily_loss_pct", "Current UTC-day portfolio loss, percent");
    describe_gauge!("risk_open_events", "Risk events awaiting resolution");
    describe_gauge!(
        "risk_pending_approvals",
        "Approval requests awaiting signatures"
    );

    Ok(())
}
