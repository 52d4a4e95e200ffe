use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Encoder, Histogram, IntCounter,
    IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref REQUESTS_TOTAL: IntCounter =
        register_int_counter!("faucet_requests_total", "Total airdrop requests received").unwrap();
    pub static ref AIRDROPS_TOTAL: IntCounter =
        register_int_counter!("faucet_airdrops_total", "Successful airdrops").unwrap();
    pub static ref RATE_LIMITED_TOTAL: IntCounter =
        register_int_counter!("faucet_rate_limited_total", "Requests rejected by the wallet quota")
            .unwrap();
    pub static ref INVALID_REQUESTS_TOTAL: IntCounter =
        register_int_counter!("faucet_invalid_requests_total", "Requests with missing fields")
            .unwrap();
    pub static ref DOWNSTREAM_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "faucet_downstream_failures_total",
        "Admitted requests whose disbursement failed"
    )
    .unwrap();
    pub static ref TRACKED_WALLETS: IntGauge =
        register_int_gauge!("faucet_tracked_wallets", "Wallets held in the quota store").unwrap();
    pub static ref DISBURSE_LATENCY: Histogram = register_histogram!(
        "faucet_disburse_latency_seconds",
        "Latency of the disbursement call in seconds"
    )
    .unwrap();
}

/// Render the default registry in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_metrics() {
        REQUESTS_TOTAL.inc();
        TRACKED_WALLETS.set(3);
        let text = render();
        assert!(text.contains("faucet_requests_total"));
        assert!(text.contains("faucet_tracked_wallets"));
    }
}
