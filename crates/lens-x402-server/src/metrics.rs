use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::sync::LazyLock;

/// Requests by terminal gate state.
pub static GATE_OUTCOMES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_gate_requests_total",
        "Gated content requests by terminal state",
        &["state"]
    )
    .unwrap()
});

pub static GATE_DENIALS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_gate_denials_total",
        "Denied or failed gated requests by error code",
        &["error"]
    )
    .unwrap()
});

pub static FACILITATOR_CALLS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "x402_gate_facilitator_seconds",
        "Facilitator verify/settle round-trip latency",
        &["call", "result"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap()
});

pub static DEMO_BYPASSES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_gate_demo_bypass_total",
        "Content served while the facilitator was unreachable",
        &["stage"]
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
