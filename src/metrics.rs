use axum::{routing::get, Router};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::report::ReportStatus;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once, from the entrypoint.
    pub fn init() -> anyhow::Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("reports_created_total", "Reports persisted at PENDING_VERIFICATION.");
        describe_counter!(
            "reports_verified_total",
            "Verification outcomes by resulting status."
        );
        describe_counter!(
            "verification_failures_total",
            "Classifier failures by kind (unavailable/format)."
        );
        describe_counter!("report_overrides_total", "Owner-consented overrides applied.");
        describe_counter!("image_uploads_total", "Image uploads by outcome.");
        describe_histogram!(
            "verification_duration_ms",
            "Wall time of one verification attempt in milliseconds."
        );
        describe_gauge!(
            "verification_in_flight",
            "Verification tasks currently running."
        );
    });
}

pub(crate) fn record_created() {
    counter!("reports_created_total").increment(1);
}

pub(crate) fn record_upload(outcome: &'static str) {
    counter!("image_uploads_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_verified(status: ReportStatus, elapsed_ms: f64) {
    counter!("reports_verified_total", "status" => status.as_str()).increment(1);
    histogram!("verification_duration_ms").record(elapsed_ms);
}

pub(crate) fn record_verification_failure(kind: &'static str) {
    counter!("verification_failures_total", "kind" => kind).increment(1);
}

pub(crate) fn record_override() {
    counter!("report_overrides_total").increment(1);
}

/// Tracks one running verification task; decrements on drop.
pub(crate) struct InFlight;

impl InFlight {
    pub(crate) fn start() -> Self {
        gauge!("verification_in_flight").increment(1.0);
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!("verification_in_flight").decrement(1.0);
    }
}
