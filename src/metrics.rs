use std::net::SocketAddr;
use tracing::{info, warn};

/// Installs the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            info!("Prometheus exporter listening on http://{}/metrics", addr);
        }
        Err(e) => {
            warn!("Prometheus exporter install failed (possibly already installed): {}", e);
        }
    }
}

pub mod http {
    pub fn request(route: &'static str) {
        ::metrics::counter!("csv_service_http_requests_total", "route" => route).increment(1);
    }

    pub fn request_error(route: &'static str, status: u16) {
        ::metrics::counter!(
            "csv_service_http_request_errors_total",
            "route" => route,
            "status" => status.to_string()
        )
        .increment(1);
    }

    pub fn rows_served(route: &'static str, rows: usize) {
        ::metrics::counter!("csv_service_rows_served_total", "route" => route).increment(rows as u64);
    }
}

pub mod reconcile {
    use crate::reconcile::ReconcileSummary;

    pub fn run_complete(summary: &ReconcileSummary) {
        ::metrics::counter!("csv_service_reconcile_runs_total").increment(1);
        ::metrics::counter!("csv_service_reconcile_rows_filled_total")
            .increment(summary.rows_filled as u64);
        ::metrics::counter!("csv_service_reconcile_rows_unmatched_total")
            .increment(summary.rows_unmatched as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::ReconcileSummary;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn counters_reach_the_prometheus_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            http::request("/data");
            http::request_error("/csv", 404);
            reconcile::run_complete(&ReconcileSummary {
                rows_total: 3,
                rows_missing: 2,
                rows_filled: 1,
                rows_unmatched: 1,
            });
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"csv_service_http_requests_total{route="/data"} 1"#));
        assert!(rendered.contains("csv_service_http_request_errors_total"));
        assert!(rendered.contains("csv_service_reconcile_rows_filled_total 1"));
    }
}
