use axum::{http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder");

        metrics::describe_counter!(
            "chat_messages_persisted_total",
            "Total number of chat messages written to the store"
        );
        metrics::describe_counter!(
            "chat_live_pushes_total",
            "Total number of messages pushed to a live connection"
        );
        metrics::describe_counter!(
            "chat_events_dropped_total",
            "Total number of inbound chat events dropped"
        );
        metrics::describe_gauge!(
            "chat_open_connections",
            "Number of currently open chat connections"
        );

        Self { handle }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler for Prometheus metrics endpoint
pub async fn metrics_handler(handle: axum::extract::State<PrometheusHandle>) -> impl IntoResponse {
    let metrics = handle.render();
    (StatusCode::OK, metrics)
}

pub fn record_message_persisted() {
    metrics::counter!("chat_messages_persisted_total").increment(1);
}

pub fn record_live_push() {
    metrics::counter!("chat_live_pushes_total").increment(1);
}

pub fn record_event_dropped() {
    metrics::counter!("chat_events_dropped_total").increment(1);
}

pub fn update_connection_gauge(open: usize) {
    metrics::gauge!("chat_open_connections").set(open as f64);
}
