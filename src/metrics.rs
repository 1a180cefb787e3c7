//! A small metrics facade (§2.10): counters and a histogram for order and
//! renewal activity, exposed to hosts that want to scrape them via
//! `prometheus`. Grounded on `metrics/mod.rs`'s `MetricsRegistry` — same
//! registry/encoder shape, renamed counters, plus a latency histogram.
//! Degrades to an unused, zero-cost singleton when nothing reads it.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::OnceLock;

pub struct DriverMetrics {
    registry: Registry,
    pub orders_started_total: IntCounter,
    pub orders_succeeded_total: IntCounter,
    pub orders_failed_total: IntCounter,
    pub challenge_attempts_total: IntCounter,
    pub renewal_latency_seconds: Histogram,
}

impl DriverMetrics {
    fn new() -> Self {
        let registry = Registry::new();
        let orders_started_total = IntCounter::new("acmed_orders_started_total", "order driver runs started").unwrap();
        let orders_succeeded_total = IntCounter::new("acmed_orders_succeeded_total", "order driver runs that issued a certificate").unwrap();
        let orders_failed_total = IntCounter::new("acmed_orders_failed_total", "order driver runs that ended in error").unwrap();
        let challenge_attempts_total =
            IntCounter::new("acmed_challenge_attempts_total", "authorization sub-driver runs started").unwrap();
        let renewal_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "acmed_renewal_latency_seconds",
            "wall-clock time to drive one managed domain to a terminal state",
        ))
        .unwrap();

        registry.register(Box::new(orders_started_total.clone())).unwrap();
        registry.register(Box::new(orders_succeeded_total.clone())).unwrap();
        registry.register(Box::new(orders_failed_total.clone())).unwrap();
        registry.register(Box::new(challenge_attempts_total.clone())).unwrap();
        registry.register(Box::new(renewal_latency_seconds.clone())).unwrap();

        Self {
            registry,
            orders_started_total,
            orders_succeeded_total,
            orders_failed_total,
            challenge_attempts_total,
            renewal_latency_seconds,
        }
    }

    /// Renders every registered metric in the Prometheus text exposition
    /// format, for a `GET /metrics` handler to return verbatim.
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer).unwrap();
        String::from_utf8_lossy(&buffer).to_string()
    }
}

impl Default for DriverMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<DriverMetrics> = OnceLock::new();

/// The process-wide metrics instance, created on first use.
pub fn global() -> &'static DriverMetrics {
    METRICS.get_or_init(DriverMetrics::new)
}
