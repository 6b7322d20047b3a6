use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};
use std::sync::LazyLock;

/// Relayed requests by upstream status (or `error`).
pub static RELAYS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_proxy_relays_total",
        "Requests relayed to the resource server",
        &["status"]
    )
    .unwrap()
});

pub static RELAY_LATENCY: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "x402_proxy_relay_duration_seconds",
        "Round trip to the resource server",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 15.0]
    )
    .unwrap()
});

pub fn metrics_output() -> String {
    let mut buffer = Vec::new();
    if TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .is_err()
    {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
