use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static PROPOSALS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "relay_proposals_total",
            "session proposals resolved by outcome",
        ),
        &["result"],
    )
    .expect("valid proposal counter");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "relay_requests_total",
            "session requests handled by route and outcome",
        ),
        &["route", "result"],
    )
    .expect("valid request counter");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static CHAIN_SWITCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("relay_chain_switches_total", "chain switches by outcome"),
        &["result"],
    )
    .expect("valid chain switch counter");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub fn gather() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %err, "metrics encode error");
    }
    buffer
}
