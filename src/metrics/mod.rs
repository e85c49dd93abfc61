// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

// Re-export for public API
pub use server::{start_http_server, AppState};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Feed messages by outcome (persisted, malformed, redelivery)
// - Message processing latency
// - Lookups by source (cache hit, store fallback, miss)
// - Cache warm-up size
// - Consumer lifecycle state
//
// Every Metrics value owns its own registry, exposed via /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub messages_total: IntCounterVec,
    pub message_duration: HistogramVec,
    pub lookups_total: IntCounterVec,
    pub warmup_orders: IntGauge,
    pub consumer_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let messages_total = IntCounterVec::new(
            Opts::new("order_messages_total", "Feed messages handled, by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(messages_total.clone()))?;

        let message_duration = HistogramVec::new(
            HistogramOpts::new(
                "order_message_duration_seconds",
                "Time from message receipt to ack decision",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(message_duration.clone()))?;

        let lookups_total = IntCounterVec::new(
            Opts::new("order_lookups_total", "Order lookups, by where they were answered"),
            &["source"],
        )?;
        registry.register(Box::new(lookups_total.clone()))?;

        let warmup_orders = IntGauge::new(
            "order_cache_warmup_orders",
            "Orders loaded into the cache at startup",
        )?;
        registry.register(Box::new(warmup_orders.clone()))?;

        let consumer_state = IntGauge::new(
            "order_consumer_state",
            "Consumer state (0=Disconnected, 1=Connecting, 2=Subscribed, 3=Draining, 4=Closed)",
        )?;
        registry.register(Box::new(consumer_state.clone()))?;

        Ok(Self {
            registry,
            messages_total,
            message_duration,
            lookups_total,
            warmup_orders,
            consumer_state,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_message(&self, outcome: &str, duration_secs: f64) {
        self.messages_total.with_label_values(&[outcome]).inc();
        self.message_duration.with_label_values(&[outcome]).observe(duration_secs);
    }

    pub fn record_lookup(&self, source: &str) {
        self.lookups_total.with_label_values(&[source]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(metrics: &Metrics, name: &str, label: &str) -> Option<f64> {
        metrics
            .registry
            .gather()
            .iter()
            .find(|m| m.name() == name)?
            .metric
            .iter()
            .find(|m| m.label.iter().any(|l| l.value() == label))
            .and_then(|m| m.counter.value)
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.warmup_orders.set(3);
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_record_message() {
        let metrics = Metrics::new().unwrap();
        metrics.record_message("persisted", 0.01);
        metrics.record_message("persisted", 0.02);
        metrics.record_message("malformed", 0.0);

        assert_eq!(counter(&metrics, "order_messages_total", "persisted"), Some(2.0));
        assert_eq!(counter(&metrics, "order_messages_total", "malformed"), Some(1.0));
    }

    #[test]
    fn test_record_lookup() {
        let metrics = Metrics::new().unwrap();
        metrics.record_lookup("cache");
        metrics.record_lookup("store");
        metrics.record_lookup("cache");

        assert_eq!(counter(&metrics, "order_lookups_total", "cache"), Some(2.0));
        assert_eq!(counter(&metrics, "order_lookups_total", "store"), Some(1.0));
        assert_eq!(counter(&metrics, "order_lookups_total", "miss"), None);
    }
}
