//! Prometheus metrics utilities

use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

lazy_static::lazy_static! {
    /// HTTP request counter
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "gateway_http_requests_total",
        "Total number of HTTP requests",
        &["method", "status"]
    ).unwrap();

    /// HTTP request duration histogram
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "gateway_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Rate-limit decision counter
    pub static ref RATE_LIMIT_DECISIONS_TOTAL: CounterVec = register_counter_vec!(
        "gateway_rate_limit_decisions_total",
        "Rate-limit gate decisions",
        &["decision"]
    ).unwrap();

    /// Published abuse event counter
    pub static ref ABUSE_EVENTS_TOTAL: CounterVec = register_counter_vec!(
        "gateway_abuse_events_total",
        "Abuse events published to the event bus",
        &["event_type"]
    ).unwrap();

    /// Currently blocked IPs
    pub static ref BLOCKED_IPS: IntGauge = register_int_gauge!(
        "gateway_blocked_ips",
        "Number of IPs in the block set"
    ).unwrap();
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Metrics output is not valid UTF-8: {}", e);
        String::from("# Error: invalid UTF-8 in metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_encode() {
        HTTP_REQUESTS_TOTAL.with_label_values(&["GET", "200"]).inc();
        RATE_LIMIT_DECISIONS_TOTAL.with_label_values(&["allow"]).inc();

        let output = encode_metrics();
        assert!(output.contains("gateway_http_requests_total"));
        assert!(output.contains("gateway_rate_limit_decisions_total"));
    }
}
